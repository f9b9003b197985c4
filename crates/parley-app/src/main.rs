//! Parley application binary - composition root.
//!
//! 1. Parse CLI arguments and load the TOML configuration
//! 2. Open the settings store in the data directory
//! 3. Pick the completion provider and speech backend
//! 4. Start the axum API server

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use parley_api::{start_server, AppState};
use parley_attachments::LocatorStore;
use parley_chat::{ConversationOrchestrator, FileStorage, SettingsStore};
use parley_completion::{validate_credential, CompletionClient, OpenAiClient, SimulatedClient};
use parley_core::config::{CompletionProvider, ParleyConfig, SpeechBackendKind};
use parley_speech::{RecognitionBackend, ScriptedBackend, SpeechCapture, UnsupportedBackend};

use crate::cli::CliArgs;

/// Pause between scripted dictation phrases.
const SCRIPTED_PHRASE_INTERVAL: Duration = Duration::from_millis(400);

fn completion_client(
    config: &ParleyConfig,
    simulated: bool,
) -> Result<Arc<dyn CompletionClient>, Box<dyn std::error::Error>> {
    if simulated || config.completion.provider == CompletionProvider::Simulated {
        tracing::info!(
            delay_ms = config.completion.simulated_delay_ms,
            "Using simulated completion provider"
        );
        return Ok(Arc::new(SimulatedClient::from_config(&config.completion)));
    }
    let client = OpenAiClient::from_config(&config.completion)?;
    tracing::info!(base_url = %client.base_url(), "Using OpenAI-compatible completion provider");
    Ok(Arc::new(client))
}

fn speech_backend(config: &ParleyConfig) -> Arc<dyn RecognitionBackend> {
    match config.speech.backend {
        SpeechBackendKind::Scripted => Arc::new(
            ScriptedBackend::from_phrases(config.speech.scripted_phrases.clone())
                .with_interval(SCRIPTED_PHRASE_INTERVAL),
        ),
        SpeechBackendKind::Unsupported => Arc::new(UnsupportedBackend),
    }
}

/// Seed an empty stored credential from `OPENAI_API_KEY`.
fn seed_credential(settings: &SettingsStore) {
    if !settings.current().credential.is_empty() {
        return;
    }
    let Ok(key) = std::env::var("OPENAI_API_KEY") else {
        return;
    };
    if validate_credential(&key).is_none() {
        tracing::warn!("OPENAI_API_KEY is set but is not a valid API key, ignoring");
        return;
    }
    match settings.update(|c| c.credential = key.trim().to_string()) {
        Ok(_) => tracing::info!("Credential seeded from OPENAI_API_KEY"),
        Err(e) => tracing::warn!(error = %e, "Failed to seed credential"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);
    config.server.port = args.resolve_port(config.server.port);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Settings.
    let data_dir = config.resolved_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let settings = Arc::new(SettingsStore::new(Arc::new(FileStorage::new(&data_dir))));
    seed_credential(&settings);
    tracing::info!(path = %data_dir.display(), "Settings store opened");

    // Services.
    let client = completion_client(&config, args.simulated)?;
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        client,
        settings,
        Arc::new(LocatorStore::new()),
    ));
    if !orchestrator.is_configured() {
        tracing::warn!("No valid API key configured; add one via PUT /settings");
    }

    let speech = SpeechCapture::new(speech_backend(&config));
    tracing::info!(
        backend = ?config.speech.backend,
        available = speech.is_available(),
        "Speech capture ready"
    );

    // === API server ===

    let state = AppState::new(config.clone(), orchestrator, speech);
    if let Err(e) = start_server(&config, state).await {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!("Try: parley --port {}", config.server.port.saturating_add(1));
        return Err(e.into());
    }

    Ok(())
}
