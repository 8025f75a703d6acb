pub mod config;
pub mod deploy;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod signature;
pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};
use std::sync::Arc;
use tokio::sync::Mutex;

use config::DeployConfig;
use deploy::DeploymentExecutor;

pub struct AppState {
    /// Serializes webhook handling so at most one deployment runs at a time.
    pub job_execution_lock: Mutex<()>,
    pub config: DeployConfig,
    pub executor: DeploymentExecutor,
}

impl AppState {
    pub fn new(config: DeployConfig) -> Self {
        let executor = DeploymentExecutor::from_config(&config);
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: DeployConfig, executor: DeploymentExecutor) -> Self {
        Self {
            job_execution_lock: Mutex::new(()),
            config,
            executor,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// `GET /health` and `POST /webhook`; anything else is a 404.
///
/// Push payloads are read in full regardless of size.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/health",
            routing::get(handlers::health).fallback(handlers::not_found),
        )
        .route(
            "/webhook",
            routing::post(handlers::handle_webhook).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}
