//! Config surface (spec §6) — loaded from TOML, environment-overridable.
//!
//! Grounded in the teacher CLI's `Config::load`/`save` (`toml` +
//! `serde`), generalized from a user-profile file to a service config.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Sync worker pool size. Default 3.
    #[serde(default = "default_max_concurrent_syncs")]
    pub max_concurrent_syncs: usize,
    /// Bound on the orchestrator's pending-job queue before
    /// `SyncQueueFull` is returned to callers.
    #[serde(default = "default_sync_queue_capacity")]
    pub sync_queue_capacity: usize,
    /// Correlation window, minutes, `[1, 1440]`. Default 15.
    #[serde(default = "default_correlation_window_minutes")]
    pub correlation_window_minutes: u32,
    /// Engine tick cadence, milliseconds. Default 60000.
    #[serde(default = "default_correlation_interval_ms")]
    pub correlation_interval_ms: u64,
    /// Canonical fallback severity mapping applied when no integration
    /// override matches.
    #[serde(default = "default_severity_mapping")]
    pub default_severity_mapping: crate::integration::SeverityMapping,
    /// Drain deadline on shutdown, seconds. Default 30.
    #[serde(default = "default_drain_deadline_secs")]
    pub drain_deadline_secs: u64,
    /// Bounded grace period for an optional eager reconnect-on-boot pass
    /// (spec §9, "Reconstruction on startup"). `0` disables eager
    /// reconnect and adapters are rebuilt lazily on first use.
    #[serde(default)]
    pub eager_reconnect_grace_secs: u64,
}

fn default_max_concurrent_syncs() -> usize {
    3
}

fn default_sync_queue_capacity() -> usize {
    256
}

fn default_correlation_window_minutes() -> u32 {
    15
}

fn default_correlation_interval_ms() -> u64 {
    60_000
}

fn default_drain_deadline_secs() -> u64 {
    30
}

fn default_severity_mapping() -> crate::integration::SeverityMapping {
    crate::integration::SeverityMapping {
        critical: vec!["critical".into(), "p1".into(), "sev1".into(), "10".into(), "9".into()],
        high: vec!["high".into(), "p2".into(), "sev2".into(), "8".into(), "7".into()],
        medium: vec!["medium".into(), "p3".into(), "sev3".into(), "6".into(), "5".into(), "4".into()],
        low: vec!["low".into(), "p4".into(), "sev4".into(), "3".into(), "2".into()],
        info: vec!["info".into(), "informational".into(), "p5".into(), "0".into(), "1".into()],
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_syncs: default_max_concurrent_syncs(),
            sync_queue_capacity: default_sync_queue_capacity(),
            correlation_window_minutes: default_correlation_window_minutes(),
            correlation_interval_ms: default_correlation_interval_ms(),
            default_severity_mapping: default_severity_mapping(),
            drain_deadline_secs: default_drain_deadline_secs(),
            eager_reconnect_grace_secs: 0,
        }
    }
}

impl FusionConfig {
    /// Load from a TOML file, falling back to defaults if it does not
    /// exist. Environment variables prefixed `FUSION_` override scalar
    /// fields (e.g. `FUSION_MAX_CONCURRENT_SYNCS=5`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FUSION_MAX_CONCURRENT_SYNCS") {
            if let Ok(n) = v.parse() {
                self.max_concurrent_syncs = n;
            }
        }
        if let Ok(v) = std::env::var("FUSION_CORRELATION_WINDOW_MINUTES") {
            if let Ok(n) = v.parse() {
                self.correlation_window_minutes = n;
            }
        }
        if let Ok(v) = std::env::var("FUSION_CORRELATION_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.correlation_interval_ms = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_syncs == 0 {
            return Err(ConfigError::Invalid("maxConcurrentSyncs must be >= 1".into()));
        }
        if !(1..=1440).contains(&self.correlation_window_minutes) {
            return Err(ConfigError::Invalid(
                "correlationWindowMinutes must be in [1, 1440]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
