//! Stagehand configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::OutcomeKind;
use crate::stage::DEFAULT_CUE_TIMEOUT;

/// Stagehand configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagehandConfig {
    /// Native reporter settings
    pub notifier: NotifierConfig,

    /// Event bus settings
    pub stage: StageConfig,
}

/// Native reporter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Worker/capability id stamped on every payload
    pub cid: String,

    /// Spec files the worker was given
    pub specs: Vec<String>,

    /// Most severe outcome still counted as a success
    pub success_threshold: OutcomeKind,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            cid: "0-0".to_string(),
            specs: Vec::new(),
            success_threshold: OutcomeKind::Ignored,
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// How long `wait_for_next_cue` waits for outstanding async operations
    pub cue_timeout_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            cue_timeout_ms: DEFAULT_CUE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StageConfig {
    pub fn cue_timeout(&self) -> Duration {
        Duration::from_millis(self.cue_timeout_ms)
    }
}

impl StagehandConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.notifier.cid.trim().is_empty() {
            return Err(Error::InvalidConfig("notifier.cid must not be empty".to_string()));
        }
        if self.stage.cue_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "stage.cue_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StagehandConfig::load(&dir.path().join("stagehand.toml")).unwrap();

        assert_eq!(config, StagehandConfig::default());
        assert_eq!(config.notifier.cid, "0-0");
        assert_eq!(config.notifier.success_threshold, OutcomeKind::Ignored);
        assert_eq!(config.stage.cue_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stagehand.toml");

        let mut config = StagehandConfig::default();
        config.notifier.cid = "1-2".to_string();
        config.notifier.specs = vec!["/project/checkout.spec.ts".to_string()];
        config.notifier.success_threshold = OutcomeKind::Pending;
        config.stage.cue_timeout_ms = 5_000;

        config.save(&path).unwrap();
        assert_eq!(StagehandConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stagehand.toml");
        std::fs::write(&path, "[stage]\ncue_timeout_ms = 1000\n").unwrap();

        let config = StagehandConfig::load(&path).unwrap();
        assert_eq!(config.stage.cue_timeout_ms, 1000);
        assert_eq!(config.notifier, NotifierConfig::default());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stagehand.toml");
        std::fs::write(&path, "[notifier\ncid = ").unwrap();

        assert!(matches!(StagehandConfig::load(&path), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_validate_rejects_empty_cid_and_zero_timeout() {
        let mut config = StagehandConfig::default();
        assert!(config.validate().is_ok());

        config.notifier.cid = " ".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.notifier.cid = "0-0".to_string();
        config.stage.cue_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
