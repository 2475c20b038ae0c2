use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use uuid::Uuid;

use super::{CloneVoiceRequest, CloneVoiceResponse, HealthResponse, ServiceInfo, SynthesizeResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::SynthesisRequest;

pub const SPEED_RANGE: RangeInclusive<f64> = 0.5..=2.0;

/// The only encoding the backends produce.
const AUDIO_FORMAT: &str = "wav";

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Json<SynthesizeResponse>, AppError> {
    let Json(request) = payload?;

    if !SPEED_RANGE.contains(&request.speed) {
        return Err(AppError::Validation(format!(
            "speed must be between {} and {}, got {}",
            SPEED_RANGE.start(),
            SPEED_RANGE.end(),
            request.speed
        )));
    }

    let preview: String = request.text.chars().take(50).collect();
    tracing::info!(
        "Synthesize request: text='{}...', voice={}",
        preview,
        request.voice
    );

    if !request.output_format.eq_ignore_ascii_case(AUDIO_FORMAT) {
        tracing::debug!(
            "Requested format '{}' is not supported, returning {}",
            request.output_format,
            AUDIO_FORMAT
        );
    }

    let start = Instant::now();
    let result = state.synthesizer.handle(&request).await?;

    tracing::info!(
        "Synthesis complete: {}ms audio in {}ms",
        result.duration_ms,
        start.elapsed().as_millis()
    );

    Ok(Json(SynthesizeResponse {
        audio_data_base64: BASE64.encode(&result.audio),
        duration_ms: result.duration_ms,
        sample_rate_hz: result.sample_rate_hz,
        format: AUDIO_FORMAT.to_string(),
    }))
}

/// Placeholder until voice cloning exists: checks the reference file and
/// hands back a stub id.
pub async fn clone_voice(
    payload: Result<Json<CloneVoiceRequest>, JsonRejection>,
) -> Result<Json<CloneVoiceResponse>, AppError> {
    let Json(request) = payload?;

    tracing::info!(
        "Voice clone request: name='{}', reference={}",
        request.voice_name,
        request.reference_audio_path
    );
    if !request.description.is_empty() {
        tracing::debug!("Voice description: {}", request.description);
    }

    let exists = tokio::fs::try_exists(&request.reference_audio_path)
        .await
        .unwrap_or(false);
    if !exists {
        return Err(AppError::ReferenceNotFound(request.reference_audio_path));
    }

    let voice_id = stub_voice_id(&request.voice_name);
    tracing::warn!("Voice cloning not implemented, returning stub voice id {}", voice_id);

    Ok(Json(CloneVoiceResponse {
        status: "pending".to_string(),
        message: format!(
            "Voice cloning not yet implemented. Qwen3-TTS VoiceDesign model required. Stub voice_id: {}",
            voice_id
        ),
        voice_id: Some(voice_id),
    }))
}

/// `custom_<name>_<8 hex chars>`, with the name lowercased and spaces
/// replaced by underscores.
pub fn stub_voice_id(voice_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "custom_{}_{}",
        voice_name.to_lowercase().replace(' ', "_"),
        &suffix[..8]
    )
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model = state.synthesizer.state();
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: model.is_loaded(),
        model_name: model.model_name().map(str::to_string),
        port: state.port,
    })
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Qwen TTS Server".to_string(),
        status: "running".to_string(),
        model_loaded: state.synthesizer.state().is_loaded(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
