/// Custom error type for push_deploy_hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Signature verification failed")]
    AuthenticationFailure,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for HookError {
    fn from(e: serde_json::Error) -> Self {
        HookError::MalformedPayload(e.to_string())
    }
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
