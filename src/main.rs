use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use tts::system::VoiceEngine;
use tts::{EspeakEngine, ModelLoader, Synthesizer, SystemVoiceBackend, VoiceRegistry};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let config = Config::from_env().expect("Invalid configuration");

    let addr: SocketAddr = config.addr().parse().expect("Invalid address");

    tracing::info!("Qwen TTS Server v{}", env!("CARGO_PKG_VERSION"));

    // The load state is fixed here, before the listener accepts anything.
    let model_state = ModelLoader::from_config(&config).load().await;
    tracing::info!("Model loaded: {}", model_state.is_loaded());
    if let tts::ModelLoadState::FailedFallback(reason) = &model_state {
        tracing::info!("Serving with system voice only ({})", reason);
    }

    let system = match EspeakEngine::detect(&config.espeak_bin) {
        Ok(engine) => {
            tracing::info!(
                "System voice: {} ({} voices)",
                engine.program().display(),
                engine.voices().len()
            );
            SystemVoiceBackend::new(VoiceRegistry::default(), Arc::new(engine))
        }
        Err(e) => {
            tracing::warn!("{}", e);
            SystemVoiceBackend::unavailable(VoiceRegistry::default())
        }
    };

    if !model_state.is_loaded() && !system.is_available() {
        tracing::warn!("No synthesis backend available, /synthesize will fail");
    }

    // Create app state
    let state = Arc::new(AppState {
        synthesizer: Synthesizer::new(model_state, Arc::new(system)),
        port: config.port,
    });

    // Create router
    let app = create_router(state, &config.cors_origins);

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Shutting down Qwen TTS server");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
