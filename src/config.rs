//! Engine configuration.
//!
//! Capability outcomes come from probes, not configuration; config covers
//! the knobs an operator may legitimately want to turn.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Locale assumed for viewers until their first metadata-change event.
    pub default_locale: String,

    /// Seconds between repeated fault log lines for the same family+kind.
    pub fault_log_window_secs: u64,

    /// Operation families forced down to their terminal no-op regardless of
    /// probe outcomes (`"chat"`, `"boss-bar"`, ...).
    pub disabled_families: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_locale: "en_US".to_string(),
            fault_log_window_secs: 30,
            disabled_families: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid TOML for this schema.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse engine configuration")
    }

    /// Fault log window as a duration.
    pub fn fault_log_window(&self) -> Duration {
        Duration::from_secs(self.fault_log_window_secs)
    }

    pub(crate) fn family_disabled(&self, family: &str) -> bool {
        self.disabled_families.iter().any(|f| f == family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.default_locale, "en_US");
        assert_eq!(config.fault_log_window(), Duration::from_secs(30));
        assert!(!config.family_disabled("chat"));
    }

    #[test]
    fn parses_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            default_locale = "de_DE"
            disabled_families = ["boss-bar"]
            "#,
        )
        .unwrap();
        assert_eq!(config.default_locale, "de_DE");
        assert!(config.family_disabled("boss-bar"));
        assert_eq!(config.fault_log_window_secs, 30);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(EngineConfig::from_toml_str("default_locale = [").is_err());
    }
}
