//! Optional tracing initialization helper.
//!
//! Installs a global subscriber that honours `RUST_LOG`. Compilation logs
//! one canonical line per operation under the `morphstack::compile` target.
//! You can configure tracing yourself if you prefer.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
            ..Default::default()
        }
    }

    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.default_filter)?),
        }
    }
}

/// Fails if the filter does not parse or a global subscriber is already
/// installed.
pub fn init(config: TelemetryConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);

    if config.json_logs {
        let fmt_layer = tracing_subscriber::fmt::layer().json().flatten_event(true);
        registry.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        registry.with(fmt_layer).try_init()?;
    }

    tracing::debug!(json = config.json_logs, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TelemetryConfig::new("morphstack=debug").with_json_logs(true);
        assert_eq!(config.default_filter, "morphstack=debug");
        assert!(config.json_logs);
        assert_eq!(TelemetryConfig::default().default_filter, "info");
    }
}
