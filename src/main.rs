use anyhow::Context;
use deploy_webhook::api::create_router;
use deploy_webhook::dispatch::ScriptDispatcher;
use deploy_webhook::logging::LogFacility;
use deploy_webhook::{AppState, load_config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "webhook_config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("WEBHOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = load_config(&config_path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    let addr = config.socket_addr()?;

    let log_guard = LogFacility::new(&config.log_dir).initialize()?;

    info!("Starting webhook server");
    info!("Using config at {:?}", config_path);
    info!(
        "Deployment script: {} (timeout: {})",
        config.script.path.display(),
        config
            .script
            .timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string())
    );

    let dispatcher = Arc::new(ScriptDispatcher::from_config(&config.script));
    let state = Arc::new(AppState::new(config, dispatcher));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Webhook server stopped");
    drop(log_guard);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
