use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FlockError, FlockResult};

/// Service configuration.
///
/// Every field has a default, so a YAML file only needs to name what it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlockConfig {
    /// Directory scanned for segment files
    pub segment_root: PathBuf,

    /// File extension of segment files, without the dot
    pub extension: String,

    /// Number of recent segments kept in the playback window
    pub window_capacity: usize,

    /// Chance of abandoning the current chain for a random loop
    pub jump_probability: f64,

    /// Chance of taking an available loop when not jumping
    pub loop_probability: f64,

    /// Scheduler steps between two catalog reloads
    pub reload_every: u64,

    /// Idle time before retrying when the catalog is empty
    pub empty_retry_secs: u64,

    /// HTTP listen port
    pub port: u16,

    /// URL path the segment files are served under
    pub segment_url_prefix: String,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            segment_root: PathBuf::from("segments"),
            extension: "mp4".to_string(),
            window_capacity: 10,
            jump_probability: 0.02,
            loop_probability: 0.90,
            reload_every: 100,
            empty_retry_secs: 5,
            port: 8080,
            segment_url_prefix: "/sheep".to_string(),
        }
    }
}

impl FlockConfig {
    /// Parse a YAML document, falling back to defaults for missing keys.
    pub fn from_yaml(text: &str) -> FlockResult<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|err| FlockError::invalid_config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FlockResult<()> {
        for (name, value) in [
            ("jump_probability", self.jump_probability),
            ("loop_probability", self.loop_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FlockError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.window_capacity == 0 {
            return Err(FlockError::invalid_config("window_capacity must be positive"));
        }
        if self.reload_every == 0 {
            return Err(FlockError::invalid_config("reload_every must be positive"));
        }
        if self.empty_retry_secs == 0 {
            return Err(FlockError::invalid_config("empty_retry_secs must be positive"));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(FlockError::invalid_config(
                "extension must be non-empty and given without the leading dot",
            ));
        }
        if !self.segment_url_prefix.starts_with('/')
            || self.segment_url_prefix.trim_end_matches('/').is_empty()
        {
            return Err(FlockError::invalid_config(
                "segment_url_prefix must start with `/` and name a path below the root",
            ));
        }
        Ok(())
    }

    pub fn empty_retry(&self) -> Duration {
        Duration::from_secs(self.empty_retry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FlockConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_capacity, 10);
        assert_eq!(config.reload_every, 100);
        assert_eq!(config.empty_retry(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = FlockConfig::from_yaml("segment_root: /srv/sheep\njump_probability: 0.1\n")
            .unwrap();
        assert_eq!(config.segment_root, PathBuf::from("/srv/sheep"));
        assert_eq!(config.jump_probability, 0.1);
        assert_eq!(config.loop_probability, 0.90);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            FlockConfig {
                jump_probability: 1.5,
                ..FlockConfig::default()
            },
            FlockConfig {
                loop_probability: -0.1,
                ..FlockConfig::default()
            },
            FlockConfig {
                window_capacity: 0,
                ..FlockConfig::default()
            },
            FlockConfig {
                reload_every: 0,
                ..FlockConfig::default()
            },
            FlockConfig {
                extension: ".mp4".into(),
                ..FlockConfig::default()
            },
            FlockConfig {
                segment_url_prefix: "sheep".into(),
                ..FlockConfig::default()
            },
            FlockConfig {
                segment_url_prefix: "/".into(),
                ..FlockConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(FlockError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_yaml_errors_are_config_errors() {
        let err = FlockConfig::from_yaml("window_capacity: many").unwrap_err();
        assert!(matches!(err, FlockError::InvalidConfig(_)));
    }
}
