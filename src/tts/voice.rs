use std::collections::HashMap;

/// Built-in voice names and their position in the host's system voice list.
const BUILTIN_VOICES: [(&str, usize); 4] = [
    ("default", 0),
    ("marrvin", 0),
    ("marlin", 1),
    ("daniel", 2),
];

/// Maps logical voice names to system voice indices. Immutable once built.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: HashMap<String, usize>,
}

impl VoiceRegistry {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            voices: entries
                .into_iter()
                .map(|(name, index)| (name.into(), index))
                .collect(),
        }
    }

    /// Unknown names resolve to the first voice.
    pub fn resolve(&self, name: &str) -> usize {
        self.voices.get(name).copied().unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new(BUILTIN_VOICES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_voices() {
        let registry = VoiceRegistry::default();
        assert!(registry.contains("default"));
        assert_eq!(registry.resolve("default"), 0);
        assert_eq!(registry.resolve("marrvin"), 0);
        assert_eq!(registry.resolve("marlin"), 1);
        assert_eq!(registry.resolve("daniel"), 2);
    }

    #[test]
    fn test_unknown_voice_resolves_to_first() {
        let registry = VoiceRegistry::default();
        assert!(!registry.contains("nobody"));
        assert_eq!(registry.resolve("nobody"), 0);
        assert_eq!(registry.resolve(""), 0);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = VoiceRegistry::new([("Alba", 3)]);
        assert_eq!(registry.resolve("Alba"), 3);
        assert_eq!(registry.resolve("alba"), 0);
    }
}
