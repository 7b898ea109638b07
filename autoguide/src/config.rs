use serde::{Deserialize, Serialize};

use crate::direction::DecGuideMode;
use crate::error::{ActuatorError, ActuatorResult};

/// Mount (pulse-guided) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Length of each calibration pulse (ms)
    pub calibration_duration_ms: u32,
    /// Longest pulse sent on RA during normal guiding (ms)
    pub max_ra_duration_ms: u32,
    /// Longest pulse sent on Dec during normal guiding (ms)
    pub max_dec_duration_ms: u32,
    /// Dec guiding policy
    pub dec_guide_mode: DecGuideMode,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            calibration_duration_ms: 750,
            max_ra_duration_ms: 1000,
            max_dec_duration_ms: 1000,
            dec_guide_mode: DecGuideMode::Auto,
        }
    }
}

impl MountConfig {
    /// Check every field, reporting the first bad one
    pub fn validate(&self) -> ActuatorResult<()> {
        if self.calibration_duration_ms == 0 {
            return Err(ActuatorError::InvalidConfig(
                "calibration_duration_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with invalid fields replaced by their defaults
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();

        if config.calibration_duration_ms == 0 {
            log::warn!(
                "calibration_duration_ms must be > 0, using default {}",
                defaults.calibration_duration_ms
            );
            config.calibration_duration_ms = defaults.calibration_duration_ms;
        }

        config
    }
}

/// Step guider (adaptive optics) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepGuiderConfig {
    /// Frames averaged at each calibration reference point
    pub samples_to_average: usize,
    /// Percentage of travel usable before the mount is bumped
    pub bump_percentage: u32,
    /// Largest bump per frame, in step guider steps
    pub bump_max_steps_per_cycle: f64,
    /// Steps issued per calibration iteration
    pub calibration_steps_per_iteration: u32,
    /// Minimum averaged sweep length (pixels) for a usable calibration
    pub min_calibration_distance: f64,
    /// Iteration cap per calibration phase; derived from travel when unset
    pub max_calibration_iterations: Option<usize>,
}

impl Default for StepGuiderConfig {
    fn default() -> Self {
        Self {
            samples_to_average: 3,
            bump_percentage: 80,
            bump_max_steps_per_cycle: 1.0,
            calibration_steps_per_iteration: 4,
            min_calibration_distance: 1.0,
            max_calibration_iterations: None,
        }
    }
}

impl StepGuiderConfig {
    /// Check every field, reporting the first bad one
    pub fn validate(&self) -> ActuatorResult<()> {
        if self.samples_to_average == 0 {
            return Err(invalid("samples_to_average must be > 0"));
        }
        if self.bump_percentage == 0 {
            return Err(invalid("bump_percentage must be > 0"));
        }
        if !is_positive(self.bump_max_steps_per_cycle) {
            return Err(invalid("bump_max_steps_per_cycle must be > 0"));
        }
        if self.calibration_steps_per_iteration == 0 {
            return Err(invalid("calibration_steps_per_iteration must be > 0"));
        }
        if !is_positive(self.min_calibration_distance) {
            return Err(invalid("min_calibration_distance must be > 0"));
        }
        if self.max_calibration_iterations == Some(0) {
            return Err(invalid("max_calibration_iterations must be > 0"));
        }
        Ok(())
    }

    /// Copy with invalid fields replaced by their defaults
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();

        if config.samples_to_average == 0 {
            log::warn!(
                "samples_to_average must be > 0, using default {}",
                defaults.samples_to_average
            );
            config.samples_to_average = defaults.samples_to_average;
        }
        if config.bump_percentage == 0 {
            log::warn!(
                "bump_percentage must be > 0, using default {}",
                defaults.bump_percentage
            );
            config.bump_percentage = defaults.bump_percentage;
        }
        if !is_positive(config.bump_max_steps_per_cycle) {
            log::warn!(
                "bump_max_steps_per_cycle must be > 0, using default {:.2}",
                defaults.bump_max_steps_per_cycle
            );
            config.bump_max_steps_per_cycle = defaults.bump_max_steps_per_cycle;
        }
        if config.calibration_steps_per_iteration == 0 {
            log::warn!(
                "calibration_steps_per_iteration must be > 0, using default {}",
                defaults.calibration_steps_per_iteration
            );
            config.calibration_steps_per_iteration = defaults.calibration_steps_per_iteration;
        }
        if !is_positive(config.min_calibration_distance) {
            log::warn!(
                "min_calibration_distance must be > 0, using default {:.1}",
                defaults.min_calibration_distance
            );
            config.min_calibration_distance = defaults.min_calibration_distance;
        }
        if config.max_calibration_iterations == Some(0) {
            log::warn!("max_calibration_iterations must be > 0, deriving from travel");
            config.max_calibration_iterations = None;
        }

        config
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(msg: &str) -> ActuatorError {
    ActuatorError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MountConfig::default().validate().is_ok());
        assert!(StepGuiderConfig::default().validate().is_ok());

        let mount = MountConfig::default();
        assert_eq!(mount.calibration_duration_ms, 750);
        assert_eq!(mount.dec_guide_mode, DecGuideMode::Auto);

        let ao = StepGuiderConfig::default();
        assert_eq!(ao.samples_to_average, 3);
        assert_eq!(ao.bump_percentage, 80);
        assert_eq!(ao.calibration_steps_per_iteration, 4);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mount = MountConfig {
            calibration_duration_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            mount.validate(),
            Err(ActuatorError::InvalidConfig(_))
        ));

        let ao = StepGuiderConfig {
            bump_max_steps_per_cycle: -1.0,
            ..Default::default()
        };
        assert!(ao.validate().is_err());
    }

    #[test]
    fn test_sanitized_falls_back_to_defaults() {
        let ao = StepGuiderConfig {
            samples_to_average: 0,
            bump_percentage: 50,
            calibration_steps_per_iteration: 0,
            min_calibration_distance: f64::NAN,
            ..Default::default()
        };

        let fixed = ao.sanitized();
        assert_eq!(fixed.samples_to_average, 3);
        assert_eq!(fixed.bump_percentage, 50);
        assert_eq!(fixed.calibration_steps_per_iteration, 4);
        assert_eq!(fixed.min_calibration_distance, 1.0);
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StepGuiderConfig =
            serde_json::from_str(r#"{ "samples_to_average": 5 }"#).unwrap();
        assert_eq!(config.samples_to_average, 5);
        assert_eq!(config.bump_percentage, 80);

        let config: MountConfig =
            serde_json::from_str(r#"{ "dec_guide_mode": "North" }"#).unwrap();
        assert_eq!(config.dec_guide_mode, DecGuideMode::North);
        assert_eq!(config.max_dec_duration_ms, 1000);
    }
}
