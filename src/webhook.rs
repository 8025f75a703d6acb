//! Push event payload interpretation and the branch gate.

use serde_json::Value;

use crate::error::{HookError, Result};

/// Placeholder used when the payload does not name a branch or repository.
pub const UNKNOWN: &str = "unknown";

/// Branches whose pushes trigger a deployment.
pub const DEPLOY_BRANCHES: [&str; 2] = ["master", "main"];

/// Data extracted from a push event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub branch: String,
    pub repository_name: String,
    pub commit_sha: Option<String>,
    pub pusher_name: Option<String>,
}

impl PushEvent {
    /// Parse a raw request body.
    ///
    /// Only a body that is not a JSON object is an error; every missing field
    /// falls back to a default.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)?;
        if !payload.is_object() {
            return Err(HookError::MalformedPayload(
                "push event payload is not a JSON object".to_string(),
            ));
        }

        let repository = payload.get("repository");
        let branch = match payload.get("ref").and_then(Value::as_str) {
            Some(r) if !r.is_empty() => branch_from_ref(r).to_string(),
            _ => repository
                .and_then(|r| r.get("default_branch"))
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN)
                .to_string(),
        };
        let repository_name = repository
            .and_then(|r| r.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN)
            .to_string();

        Ok(Self {
            branch,
            repository_name,
            commit_sha: payload
                .get("after")
                .and_then(Value::as_str)
                .map(String::from),
            pusher_name: payload
                .get("pusher")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    /// Returns true if a push to this event's branch should be deployed.
    pub fn should_deploy(&self) -> bool {
        is_deploy_branch(&self.branch)
    }
}

/// Last `/`-separated segment of a ref such as `refs/heads/main`.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.rsplit('/').next().unwrap_or(git_ref)
}

pub fn is_deploy_branch(branch: &str) -> bool {
    DEPLOY_BRANCHES.contains(&branch)
}
