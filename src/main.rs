use push_deploy_hook::config::DeployConfig;
use push_deploy_hook::logging::setup_logging;
use push_deploy_hook::{AppState, build_router};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    setup_logging();

    let config = match DeployConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let bind_address = format!("{}:{}", config.host, config.port);
    info!("Webhook listener running on port {}", config.port);
    info!("Webhook URL: http://your-server:{}/webhook", config.port);
    if config.verification_enabled() {
        info!("Secret: configured");
    } else {
        info!("Secret: not set (signature verification skipped)");
    }
    info!("Deploy script: {}", config.deploy_script.display());
    info!("Deploy timeout: {}s", config.deploy_timeout_secs);

    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Webhook listener stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
