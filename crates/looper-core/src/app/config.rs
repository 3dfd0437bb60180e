//! Loop configuration (serializable part).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::LoopError;

/// How the loop thread consumes its queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Mode A: spin on `poll()` without sleeping or yielding.
    ///
    /// Lowest wake-up latency, but the loop thread keeps a full core busy even
    /// when idle. Intended for short-lived workers.
    BusyPoll,

    /// Mode B: block on a condvar until an item is pushed, the earliest
    /// delayed item becomes due, or quit is requested.
    #[default]
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Thread name and log label.
    pub name: String,
    pub mode: LoopMode,
    /// Upper bound callers use when waiting for readiness.
    pub ready_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: "looper".to_string(),
            mode: LoopMode::default(),
            ready_timeout_ms: 5_000,
        }
    }
}

impl LoopConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Reject names the OS thread builder cannot take.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.name.trim().is_empty() {
            return Err(LoopError::InvalidConfig("name must not be empty".to_string()));
        }
        if self.name.contains('\0') {
            return Err(LoopError::InvalidConfig(format!(
                "name {:?} contains a NUL byte",
                self.name
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, LoopError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoopError::InvalidConfig(format!("json decode: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LoopError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LoopError::InvalidConfig(format!("read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_to_blocking_mode() {
        let config = LoopConfig::new("worker");
        assert_eq!(config.mode, LoopMode::Blocking);
        assert_eq!(config.ready_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    #[case::nul("bad\0name")]
    fn rejects_bad_names(#[case] name: &str) {
        let err = LoopConfig::new(name).validate().unwrap_err();
        assert!(matches!(err, LoopError::InvalidConfig(_)));
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = LoopConfig::from_json_str(r#"{ "mode": "busy_poll" }"#).unwrap();
        assert_eq!(config.mode, LoopMode::BusyPoll);
        assert_eq!(config.name, "looper");
        assert_eq!(config.ready_timeout_ms, 5_000);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = LoopConfig::from_json_str(r#"{ "mode": "sideways" }"#).unwrap_err();
        assert!(err.to_string().contains("json decode"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = LoopConfig::load_from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, LoopError::InvalidConfig(_)));
    }
}
