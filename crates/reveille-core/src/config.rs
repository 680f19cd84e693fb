use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Reveille alarm service.
///
/// Loaded from `~/.reveille/config.toml` by default. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReveilleConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
}

impl ReveilleConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReveilleConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Timing policy of the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Delay applied when the user snoozes a ringing alarm.
    pub snooze_delay_ms: u64,
    /// How long an unanswered alarm rings before it stops itself.
    pub ring_timeout_ms: u64,
    /// How long a stopped alarm stays listed before it is purged.
    pub retention_ms: u64,
    /// How often stopped alarms are swept.
    pub purge_interval_ms: u64,
    /// Whether the host currently grants exact alarm scheduling.
    pub allow_exact_alarms: bool,
}

impl SchedulingConfig {
    pub fn snooze_delay(&self) -> Duration {
        Duration::from_millis(self.snooze_delay_ms)
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Sweep interval, never below one second.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_interval_ms.max(1_000))
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            snooze_delay_ms: 60_000,
            ring_timeout_ms: 10 * 60 * 1000,
            retention_ms: 5 * 60 * 1000,
            purge_interval_ms: 60_000,
            allow_exact_alarms: true,
        }
    }
}

/// Settings handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Vibration pattern as alternating off/on durations in milliseconds.
    pub vibration_pattern_ms: Vec<u64>,
    /// Repeat the vibration pattern until the ring ends.
    pub vibration_repeat: bool,
    pub ring_title: String,
    pub ring_text: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            vibration_pattern_ms: vec![0, 500, 500],
            vibration_repeat: true,
            ring_title: "Alarm".to_string(),
            ring_text: "Your alarm is ringing!".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReveilleError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ReveilleConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scheduling.snooze_delay_ms, 60_000);
        assert_eq!(config.scheduling.ring_timeout_ms, 600_000);
        assert_eq!(config.scheduling.retention_ms, 300_000);
        assert!(config.scheduling.allow_exact_alarms);
        assert_eq!(config.presentation.vibration_pattern_ms, vec![0, 500, 500]);
        assert!(config.presentation.vibration_repeat);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[scheduling]
snooze_delay_ms = 300000
ring_timeout_ms = 120000
retention_ms = 0
purge_interval_ms = 5000
allow_exact_alarms = false

[presentation]
vibration_pattern_ms = [0, 1000]
vibration_repeat = false
ring_title = "Wake up"
ring_text = "Rise and shine"
"#;
        let file = create_temp_config(content);
        let config = ReveilleConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.scheduling.snooze_delay(), Duration::from_secs(300));
        assert_eq!(config.scheduling.ring_timeout(), Duration::from_secs(120));
        assert_eq!(config.scheduling.retention(), Duration::ZERO);
        assert!(!config.scheduling.allow_exact_alarms);
        assert_eq!(config.presentation.vibration_pattern_ms, vec![0, 1000]);
        assert_eq!(config.presentation.ring_title, "Wake up");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[scheduling]
snooze_delay_ms = 1000
"#;
        let file = create_temp_config(content);
        let config = ReveilleConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduling.snooze_delay_ms, 1000);
        assert_eq!(config.scheduling.ring_timeout_ms, 600_000);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_invalid_config_errors() {
        let file = create_temp_config("[scheduling]\nsnooze_delay_ms = \"soon\"\n");
        let err = ReveilleConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ReveilleError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ReveilleConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.scheduling.snooze_delay_ms, 60_000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ReveilleConfig::default();
        config.scheduling.snooze_delay_ms = 90_000;
        config.presentation.vibration_repeat = false;
        config.save(&path).unwrap();

        let reloaded = ReveilleConfig::load(&path).unwrap();
        assert_eq!(reloaded.scheduling.snooze_delay_ms, 90_000);
        assert!(!reloaded.presentation.vibration_repeat);
    }

    #[test]
    fn test_purge_interval_floor() {
        let config = SchedulingConfig {
            purge_interval_ms: 10,
            ..SchedulingConfig::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(1));
    }
}
