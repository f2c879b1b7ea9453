//! Agent configuration

use agent_lib::delivery::DEFAULT_SERVER_URL;
use agent_lib::detector::CursorPolicy;
use agent_lib::ControllerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Tracking server used when neither a flag nor the credential file names one
    pub server_url: String,

    /// Find My cache file; platform default when unset
    pub cache_path: Option<PathBuf>,

    /// Credential record; `~/.locsync/config.json` when unset
    pub credentials_path: Option<PathBuf>,

    /// Seconds between poll cycles
    pub poll_interval_secs: u64,

    /// Local health/metrics port, 0 disables the endpoint
    pub api_port: u16,

    pub max_consecutive_failures: u32,

    pub request_timeout_secs: u64,

    pub cursor_policy: CursorPolicy,
}

impl AgentConfig {
    /// Load configuration from defaults and `LOCSYNC_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(config::Environment::with_prefix("LOCSYNC"))
    }

    fn load_from(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("server_url", DEFAULT_SERVER_URL)?
            .set_default("poll_interval_secs", 10)?
            .set_default("api_port", 0)?
            .set_default("max_consecutive_failures", 5)?
            .set_default("request_timeout_secs", 30)?
            .set_default("cursor_policy", "advance_on_detect")?
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            poll_interval: self.poll_interval(),
            max_consecutive_failures: self.max_consecutive_failures,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            cursor_policy: self.cursor_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<AgentConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::load_from(config::Environment::with_prefix("LOCSYNC").source(Some(source)))
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&[]).unwrap();

        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.api_port, 0);
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.cursor_policy, CursorPolicy::AdvanceOnDetect);
        assert!(config.cache_path.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = load_with(&[
            ("LOCSYNC_SERVER_URL", "https://tracker.example"),
            ("LOCSYNC_POLL_INTERVAL_SECS", "60"),
            ("LOCSYNC_API_PORT", "9100"),
            ("LOCSYNC_CURSOR_POLICY", "advance_on_confirm"),
            ("LOCSYNC_CACHE_PATH", "/tmp/Items.data"),
        ])
        .unwrap();

        assert_eq!(config.server_url, "https://tracker.example");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/Items.data")));

        let controller = config.controller_config();
        assert_eq!(controller.poll_interval, Duration::from_secs(60));
        assert_eq!(controller.cursor_policy, CursorPolicy::AdvanceOnConfirm);
        assert_eq!(controller.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        assert!(load_with(&[("LOCSYNC_POLL_INTERVAL_SECS", "soon")]).is_err());
    }
}
