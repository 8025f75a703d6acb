use axum::{
    body::Bytes,
    extract::State as AxumState,
    extract::rejection::BytesRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::SharedState;
use crate::config::DeployConfig;
use crate::error::HookError;
use crate::signature::{select_signature, verify_signature};
use crate::webhook::PushEvent;

pub const DEPLOYMENT_TRIGGERED: &str = "Deployment triggered";
pub const IGNORED_BRANCH: &str = "Ignored non-main branch";

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// Every unmatched path or method.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Handles the push webhook POST request.
///
/// Requests are processed one at a time; a qualifying push blocks the
/// response until the deployment finishes or times out.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<&'static str, HookError> {
    let body = body.map_err(|e| HookError::Unexpected(format!("failed to read body: {}", e)))?;

    let _guard = state.job_execution_lock.lock().await;

    authenticate(&state.config, &headers, &body)?;

    let event = PushEvent::parse(&body)?;
    info!(
        "Push event received: {} - {} (commit: {}, pusher: {})",
        event.repository_name,
        event.branch,
        event.commit_sha.as_deref().unwrap_or("(none)"),
        event.pusher_name.as_deref().unwrap_or("(none)"),
    );

    if !event.should_deploy() {
        info!("Skipping non-main branch: {}", event.branch);
        return Ok(IGNORED_BRANCH);
    }

    // The outcome is logged by the executor; the response only reports dispatch.
    let _outcome = state.executor.run(&state.config.deploy_script).await;
    Ok(DEPLOYMENT_TRIGGERED)
}

/// Checks the presented signature, if any.
///
/// A request without any signature header is let through with a warning;
/// only a present but wrong signature is rejected.
fn authenticate(config: &DeployConfig, headers: &HeaderMap, body: &[u8]) -> Result<(), HookError> {
    if !config.verification_enabled() {
        info!("Signature verification disabled (placeholder secret in use)");
        return Ok(());
    }

    match select_signature(headers) {
        None => {
            let names: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
            warn!("No signature header received; available headers: {:?}", names);
            Ok(())
        }
        Some(candidate) => {
            if verify_signature(body, Some(candidate.value.as_ref()), &config.secret) {
                info!("Signature verified via {}", candidate);
                Ok(())
            } else {
                warn!(
                    "Signature verification failed via {} (received: {}...)",
                    candidate,
                    candidate.preview()
                );
                Err(HookError::AuthenticationFailure)
            }
        }
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        match self {
            HookError::AuthenticationFailure => {
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            other => {
                error!("Error handling webhook: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
