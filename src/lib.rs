pub mod api;
pub mod clock;
pub mod config;
pub mod core_state;
pub mod db;
pub mod events;
pub mod models;
pub mod notifier;
pub mod reminders;
pub mod roles;
pub mod store;
pub mod voice;
pub mod watcher;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run the service until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let app_config = config::AppConfig::from_env();
    let listen_addr = app_config.listen_addr;
    let core = Arc::new(core_state::CoreState::open(app_config)?);

    let server = api::start_api_server(core.clone(), listen_addr).await?;
    tracing::info!(
        addr = %server.session.server_addr,
        transport = core.notifier_kind(),
        "Ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    server.stop().await;
    core.deactivate_all().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
