//! Startup helpers for the chat client.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;

use crate::api::client::AgentApi;
use crate::chat::store::ChatStore;
use crate::repl::{Repl, spawn_renderer};
use crate::settings::cache::{SettingsCache, SqliteSettingsCache};
use crate::settings::config::ClientConfig;
use crate::settings::store::SettingsStore;
use crate::stream::controller::ChatController;

/// Run the interactive client (used by the `agent-chat` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` when the session ends normally, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting agent-chat v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(start()) {
        tracing::error!("agent-chat failed: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Wire everything together and run the REPL until it exits.
///
/// # Errors
/// Returns an error if configuration, the settings cache or terminal I/O fails.
pub async fn start() -> Result<()> {
    let config = ClientConfig::from_env().context("reading environment")?;
    config.validate().context("validating configuration")?;
    tracing::info!("Backend endpoint: {}", config.endpoint.base_url);

    let api = Arc::new(AgentApi::new(&config.endpoint).context("building HTTP client")?);

    let cache: Arc<dyn SettingsCache> = match &config.cache_path {
        Some(path) => Arc::new(
            SqliteSettingsCache::open(path)
                .await
                .with_context(|| format!("opening settings cache {}", path.display()))?,
        ),
        None => Arc::new(SqliteSettingsCache::open_in_memory().await?),
    };
    let settings = SettingsStore::load(cache).await;

    let store = ChatStore::new().into_shared();
    let events = store.lock().await.subscribe();
    let controller = Arc::new(ChatController::new(
        Arc::clone(&store),
        api.clone(),
        api.clone(),
    ));
    let renderer = spawn_renderer(store, events, tokio::io::stdout());

    let result = Repl::new(controller, api, settings)
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;

    renderer.abort();
    result
}
