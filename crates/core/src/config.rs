//! Speculation mode and queue configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the scheduler handles stragglers. Fixed for the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpeculationMode {
    /// Pass-through to the plain queue.
    Disabled,
    /// Every task gets a lower-priority twin at submission time.
    Backup,
    /// A task gets a boosted-priority twin once its running time exceeds
    /// `average_good_duration * multiplier`.
    Threshold(f64),
}

impl SpeculationMode {
    /// Build a mode from the tester's flags. Backup tasks and threshold
    /// speculation are mutually exclusive at configuration time.
    pub fn from_flags(backup: bool, multiplier: Option<f64>) -> Result<Self, ConfigError> {
        if let Some(m) = multiplier {
            if !m.is_finite() {
                return Err(ConfigError::InvalidMultiplier(m));
            }
        }
        match (backup, multiplier) {
            (true, Some(m)) if m > 0.0 => Err(ConfigError::ConflictingModes),
            (true, _) => Ok(SpeculationMode::Backup),
            (false, Some(m)) if m > 0.0 => Ok(SpeculationMode::Threshold(m)),
            (false, Some(m)) if m == 0.0 => Ok(SpeculationMode::Backup),
            (false, _) => Ok(SpeculationMode::Disabled),
        }
    }

    /// Decode the legacy multiplier encoding: `< 0` disabled, `== 0` backup,
    /// `> 0` threshold.
    pub fn from_multiplier(multiplier: f64) -> Self {
        if multiplier < 0.0 {
            SpeculationMode::Disabled
        } else if multiplier == 0.0 {
            SpeculationMode::Backup
        } else {
            SpeculationMode::Threshold(multiplier)
        }
    }

    /// Priority delta applied to redundant copies. Backups yield to their
    /// originals; replicas preempt so the straggler race finishes quickly.
    pub fn priority_change(&self) -> i64 {
        match self {
            SpeculationMode::Disabled => 0,
            SpeculationMode::Backup => -10,
            SpeculationMode::Threshold(_) => 10,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, SpeculationMode::Disabled)
    }
}

impl fmt::Display for SpeculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeculationMode::Disabled => write!(f, "disabled"),
            SpeculationMode::Backup => write!(f, "backup"),
            SpeculationMode::Threshold(m) => write!(f, "threshold:{}", m),
        }
    }
}

/// Dispatch queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of worker slots.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Fast-abort multiplier, forwarded unchanged to the queue. `<= 0`
    /// disables it.
    #[serde(default)]
    pub fast_abort: f64,
}

fn default_workers() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fast_abort: 0.0,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flags_disabled() {
        assert_eq!(
            SpeculationMode::from_flags(false, None).unwrap(),
            SpeculationMode::Disabled
        );
        assert_eq!(
            SpeculationMode::from_flags(false, Some(-1.0)).unwrap(),
            SpeculationMode::Disabled
        );
    }

    #[test]
    fn from_flags_backup() {
        assert_eq!(
            SpeculationMode::from_flags(true, None).unwrap(),
            SpeculationMode::Backup
        );
    }

    #[test]
    fn from_flags_threshold() {
        assert_eq!(
            SpeculationMode::from_flags(false, Some(2.0)).unwrap(),
            SpeculationMode::Threshold(2.0)
        );
    }

    #[test]
    fn from_flags_conflict_is_fatal() {
        assert!(matches!(
            SpeculationMode::from_flags(true, Some(2.0)),
            Err(ConfigError::ConflictingModes)
        ));
    }

    #[test]
    fn from_flags_rejects_non_finite_multiplier() {
        assert!(matches!(
            SpeculationMode::from_flags(false, Some(f64::NAN)),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            SpeculationMode::from_flags(false, Some(f64::INFINITY)),
            Err(ConfigError::InvalidMultiplier(_))
        ));
    }

    #[test]
    fn multiplier_encoding() {
        assert_eq!(SpeculationMode::from_multiplier(-1.0), SpeculationMode::Disabled);
        assert_eq!(SpeculationMode::from_multiplier(0.0), SpeculationMode::Backup);
        assert_eq!(
            SpeculationMode::from_multiplier(1.5),
            SpeculationMode::Threshold(1.5)
        );
    }

    #[test]
    fn priority_change_per_mode() {
        assert_eq!(SpeculationMode::Disabled.priority_change(), 0);
        assert_eq!(SpeculationMode::Backup.priority_change(), -10);
        assert_eq!(SpeculationMode::Threshold(2.0).priority_change(), 10);
    }

    #[test]
    fn queue_config_validation() {
        assert!(QueueConfig::default().validate().is_ok());
        let bad = QueueConfig { workers: 0, fast_abort: 0.0 };
        assert!(bad.validate().is_err());
    }
}
