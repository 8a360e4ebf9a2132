use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::delivery::{Continuous, DeliveryModel, Polled};
use crate::error::{TrackerError, TrackerResult};
use crate::geo::DistanceUnit;
use crate::location::PositionOptions;
use crate::storage::DEFAULT_STORAGE_KEY;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_ACCURACY_THRESHOLD_M: f64 = 150.0;
pub const DEFAULT_WRITE_THRESHOLD: usize = 5;

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Which delivery model feeds the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DeliveryConfig {
    Polled {
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
    },
    Continuous,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig::Polled {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl DeliveryConfig {
    pub fn build(&self) -> Box<dyn DeliveryModel> {
        match *self {
            DeliveryConfig::Polled { interval_ms } => {
                Box::new(Polled::new(Duration::from_millis(interval_ms)))
            }
            DeliveryConfig::Continuous => Box::new(Continuous),
        }
    }
}

/// Overflow flushing settings; absent means points stay in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    pub write_threshold: usize,
    pub storage_key: String,
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig {
            write_threshold: DEFAULT_WRITE_THRESHOLD,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub delivery: DeliveryConfig,
    pub position: PositionOptions,
    /// `None` turns accuracy filtering off.
    pub accuracy_threshold_m: Option<f64>,
    pub unit: DistanceUnit,
    pub flush: Option<FlushConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            delivery: DeliveryConfig::default(),
            position: PositionOptions::default(),
            accuracy_threshold_m: Some(DEFAULT_ACCURACY_THRESHOLD_M),
            unit: DistanceUnit::Kilometers,
            flush: None,
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: TrackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if let DeliveryConfig::Polled { interval_ms: 0 } = self.delivery {
            return Err(TrackerError::InvalidParameters(
                "polling interval must be greater than zero".to_string(),
            ));
        }

        if let Some(threshold) = self.accuracy_threshold_m {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(TrackerError::InvalidParameters(format!(
                    "accuracy threshold must be a positive number of meters, got {}",
                    threshold
                )));
            }
        }

        if let Some(flush) = &self.flush {
            if flush.write_threshold == 0 {
                return Err(TrackerError::InvalidParameters(
                    "write threshold must be at least 1".to_string(),
                ));
            }
            if flush.storage_key.is_empty() {
                return Err(TrackerError::InvalidParameters(
                    "storage key must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.delivery, DeliveryConfig::Polled { interval_ms: 5000 });
        assert_eq!(config.accuracy_threshold_m, Some(150.0));
        assert!(config.position.enable_high_accuracy);
        assert!(config.flush.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: TrackerConfig = serde_json::from_str(
            r#"{
                "delivery": {"mode": "continuous"},
                "unit": "miles",
                "accuracy_threshold_m": null,
                "flush": {"write_threshold": 75}
            }"#,
        )
        .unwrap();

        assert_eq!(config.delivery, DeliveryConfig::Continuous);
        assert_eq!(config.unit, DistanceUnit::Miles);
        assert_eq!(config.accuracy_threshold_m, None);
        let flush = config.flush.unwrap();
        assert_eq!(flush.write_threshold, 75);
        assert_eq!(flush.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn test_polled_interval_default() {
        let delivery: DeliveryConfig = serde_json::from_str(r#"{"mode":"polled"}"#).unwrap();
        assert_eq!(delivery, DeliveryConfig::Polled { interval_ms: 5000 });
        assert_eq!(delivery.build().name(), "polled");
    }

    #[test]
    fn test_validation() {
        let mut config = TrackerConfig {
            delivery: DeliveryConfig::Polled { interval_ms: 0 },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidParameters(_))
        ));

        config.delivery = DeliveryConfig::Continuous;
        config.accuracy_threshold_m = Some(-1.0);
        assert!(config.validate().is_err());

        config.accuracy_threshold_m = None;
        config.flush = Some(FlushConfig {
            write_threshold: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, r#"{"delivery":{"mode":"polled","interval_ms":1000}}"#).unwrap();
        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.delivery, DeliveryConfig::Polled { interval_ms: 1000 });

        fs::write(&path, r#"{"delivery":{"mode":"polled","interval_ms":0}}"#).unwrap();
        assert!(TrackerConfig::load(&path).is_err());
    }
}
