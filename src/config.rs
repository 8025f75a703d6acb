//! Process-wide settings, resolved once at startup.
//!
//! Values come from built-in defaults, then an optional TOML file named by
//! `WEBHOOK_CONFIG`, then environment variables (highest precedence).

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HookError, Result};

/// Secret value that leaves signature verification switched off.
pub const PLACEHOLDER_SECRET: &str = "change-me-to-a-secret";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_DEPLOY_SCRIPT: &str = "/root/ServerArchive/scripts/auto-deploy.sh";
pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_DEPLOY_TIMEOUT_SECS: u64 = 600;

pub const CONFIG_PATH_VAR: &str = "WEBHOOK_CONFIG";

/// Optional overrides read from the TOML config file.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secret: Option<String>,
    pub deploy_script: Option<PathBuf>,
    pub shell: Option<String>,
    pub deploy_timeout_secs: Option<u64>,
}

/// Immutable configuration shared by every request.
#[derive(Clone)]
pub struct DeployConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub deploy_script: PathBuf,
    pub shell: String,
    pub deploy_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secret: PLACEHOLDER_SECRET.to_string(),
            deploy_script: PathBuf::from(DEFAULT_DEPLOY_SCRIPT),
            shell: DEFAULT_SHELL.to_string(),
            deploy_timeout_secs: DEFAULT_DEPLOY_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &"<REDACTED>")
            .field("deploy_script", &self.deploy_script)
            .field("shell", &self.shell)
            .field("deploy_timeout_secs", &self.deploy_timeout_secs)
            .finish()
    }
}

impl DeployConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Some(load_config_file(Path::new(&path))?),
            _ => None,
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from an optional file layer and a variable lookup.
    pub fn from_sources<F>(file: Option<FileConfig>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let defaults = DeployConfig::default();

        let port = match lookup("WEBHOOK_PORT") {
            Some(raw) => parse_var::<u16>("WEBHOOK_PORT", &raw)?,
            None => file.port.unwrap_or(defaults.port),
        };
        let deploy_timeout_secs = match lookup("DEPLOY_TIMEOUT_SECS") {
            Some(raw) => parse_var::<u64>("DEPLOY_TIMEOUT_SECS", &raw)?,
            None => file
                .deploy_timeout_secs
                .unwrap_or(defaults.deploy_timeout_secs),
        };

        let config = DeployConfig {
            host: lookup("WEBHOOK_HOST")
                .or(file.host)
                .unwrap_or(defaults.host),
            port,
            secret: lookup("WEBHOOK_SECRET")
                .or(file.secret)
                .unwrap_or(defaults.secret),
            deploy_script: lookup("DEPLOY_SCRIPT")
                .map(PathBuf::from)
                .or(file.deploy_script)
                .unwrap_or(defaults.deploy_script),
            shell: lookup("DEPLOY_SHELL")
                .or(file.shell)
                .unwrap_or(defaults.shell),
            deploy_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.deploy_timeout_secs == 0 {
            return Err(HookError::ConfigError(
                "deploy timeout must be at least one second".to_string(),
            ));
        }
        if self.shell.trim().is_empty() {
            return Err(HookError::ConfigError(
                "deploy shell must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns false while the secret is still the documented placeholder.
    pub fn verification_enabled(&self) -> bool {
        self.secret != PLACEHOLDER_SECRET
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }
}

/// Load and parse the configuration file
pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        HookError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&config_str).map_err(|e| {
        HookError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| HookError::ConfigError(format!("Invalid value for {}: '{}' ({})", name, raw, e)))
}
