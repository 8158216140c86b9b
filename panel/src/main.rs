use panel::config::PanelConfig;
use panel::crypto::Encrypter;
use panel::daemon::HttpDaemonClient;
use panel::repository::PgStore;
use panel::state::AppState;
use panel::{db, http, logging};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    // Load env if .env file exists (optional fallback)
    dotenv::dotenv().ok();

    println!("Starting panel...");

    let config = PanelConfig::load()?;
    let _log_guard = logging::init(&config.log);

    let encrypter = Encrypter::from_base64_key(&config.encryption_key)?;

    let pool = db::connect(&config.database_url).await?;
    db::ensure_schema(&pool).await?;

    let daemon = HttpDaemonClient::from_config(&config.daemon)?;
    tracing::info!(
        timeout = config.daemon.request_timeout_secs,
        connect_timeout = config.daemon.connect_timeout_secs,
        "daemon client ready"
    );

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(daemon),
        encrypter,
        config.api_key.clone(),
    );
    let app = http::router(state);

    tracing::info!(addr = %config.listen, "panel listening");
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("panel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
