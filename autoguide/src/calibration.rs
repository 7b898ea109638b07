//! Calibration results and their persistence
//!
//! [`CalibrationData`] is what a finished calibration commits to an actuator:
//! the bearing along which each axis moves the star on the detector and the
//! rate of that motion. It is owned by the actuator and turned into an
//! [`AxisTransform`] whenever a camera vector has to be resolved.

use guide_math::{wrap_bearing, AxisTransform, TransformError};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

use crate::direction::PierSide;

/// Declination beyond which the RA rate is not rescaled (radians, 60°)
pub const DEC_COMP_LIMIT: f64 = PI / 3.0;

/// Error during calibration save/load
#[derive(Error, Debug)]
pub enum CalibrationFileError {
    /// IO error during save/load
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored values do not form a usable transform
    #[error("invalid calibration: {0}")]
    Invalid(#[from] TransformError),
}

/// Committed per-axis calibration of one actuator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Bearing of star motion for the X axis (radians)
    pub x_angle: f64,
    /// Bearing of star motion for the Y axis (radians)
    pub y_angle: f64,
    /// Pixels per command unit on X
    pub x_rate: f64,
    /// Pixels per command unit on Y
    pub y_rate: f64,
    /// Declination at calibration time (radians)
    pub declination: f64,
    pub pier_side: PierSide,
}

impl CalibrationData {
    /// Values written for Y when Dec was not calibrated
    pub const NO_DEC_Y_ANGLE: f64 = 0.0;
    pub const NO_DEC_Y_RATE: f64 = 1.0;

    pub fn new(
        x_angle: f64,
        y_angle: f64,
        x_rate: f64,
        y_rate: f64,
        declination: f64,
        pier_side: PierSide,
    ) -> Self {
        Self {
            x_angle,
            y_angle,
            x_rate,
            y_rate,
            declination,
            pier_side,
        }
    }

    /// RA-only calibration with the "no Dec data" marker on Y
    pub fn without_dec(x_angle: f64, x_rate: f64, declination: f64, pier_side: PierSide) -> Self {
        Self::new(
            x_angle,
            Self::NO_DEC_Y_ANGLE,
            x_rate,
            Self::NO_DEC_Y_RATE,
            declination,
            pier_side,
        )
    }

    /// False when Y holds the exact "no Dec data" marker
    pub fn has_dec_calibration(&self) -> bool {
        !(self.y_angle == Self::NO_DEC_Y_ANGLE && self.y_rate == Self::NO_DEC_Y_RATE)
    }

    /// Build the camera/actuator transform for these values
    ///
    /// Without Dec data the Y bearing is taken perpendicular to X so that
    /// RA can still be resolved.
    pub fn transform(&self) -> Result<AxisTransform, TransformError> {
        self.transform_with_x_rate(self.x_rate)
    }

    /// Same as [`CalibrationData::transform`] but with a substitute X rate
    pub fn transform_with_x_rate(&self, x_rate: f64) -> Result<AxisTransform, TransformError> {
        let y_angle = if self.has_dec_calibration() {
            self.y_angle
        } else {
            wrap_bearing(self.x_angle + FRAC_PI_2)
        };
        AxisTransform::new(self.x_angle, y_angle, x_rate, self.y_rate)
    }

    /// RA rate rescaled for the current declination
    ///
    /// Applied only while both the current and the calibration declination
    /// lie within [`DEC_COMP_LIMIT`].
    pub fn compensated_x_rate(&self, current_declination: f64) -> f64 {
        if current_declination.abs() > DEC_COMP_LIMIT || self.declination.abs() > DEC_COMP_LIMIT {
            return self.x_rate;
        }
        self.x_rate * current_declination.cos() / self.declination.cos()
    }

    /// Calibration after a meridian flip
    ///
    /// RA reverses. Dec reverses too unless the mount itself reverses Dec
    /// after a flip.
    pub fn flipped(&self, dec_flip_required: bool) -> Self {
        let y_angle = if dec_flip_required || !self.has_dec_calibration() {
            self.y_angle
        } else {
            wrap_bearing(self.y_angle + PI)
        };

        Self {
            x_angle: wrap_bearing(self.x_angle + PI),
            y_angle,
            pier_side: self.pier_side.opposite(),
            ..*self
        }
    }

    /// Load calibration from a JSON file
    ///
    /// # Errors
    /// Returns error if file cannot be read, JSON is invalid, or the values
    /// do not form a usable transform
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationFileError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let data: Self = serde_json::from_reader(reader)?;

        data.transform()?;

        Ok(data)
    }

    /// Save calibration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationFileError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use guide_math::Point2D;

    fn sample() -> CalibrationData {
        CalibrationData::new(0.3, 0.3 + FRAC_PI_2, 0.012, 0.010, 0.2, PierSide::East)
    }

    #[test]
    fn test_dec_marker() {
        assert!(sample().has_dec_calibration());

        let ra_only = CalibrationData::without_dec(0.3, 0.012, 0.0, PierSide::West);
        assert!(!ra_only.has_dec_calibration());

        // Marker Y is replaced by a perpendicular bearing
        let transform = ra_only.transform().unwrap();
        assert_relative_eq!(transform.y_angle(), 0.3 + FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_flip_rotates_both_axes() {
        let flipped = sample().flipped(false);

        assert_relative_eq!(flipped.x_angle, wrap_bearing(0.3 + PI), epsilon = 1e-12);
        assert_relative_eq!(
            flipped.y_angle,
            wrap_bearing(0.3 + FRAC_PI_2 + PI),
            epsilon = 1e-12
        );
        assert_eq!(flipped.pier_side, PierSide::West);
        assert_eq!(flipped.x_rate, 0.012);
    }

    #[test]
    fn test_flip_keeps_dec_when_mount_reverses_it() {
        let flipped = sample().flipped(true);
        assert_relative_eq!(flipped.y_angle, 0.3 + FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_flipped_transform_reverses_ra() {
        let original = sample().transform().unwrap();
        let flipped = sample().flipped(false).transform().unwrap();

        let camera = Point2D::new(4.0, -1.5);
        let a = original.camera_to_mount(&camera).unwrap();
        let b = flipped.camera_to_mount(&camera).unwrap();

        assert_relative_eq!(a.x, -b.x, epsilon = 1e-9);
        assert_relative_eq!(a.y, -b.y, epsilon = 1e-9);
    }

    #[test]
    fn test_dec_compensation() {
        let data = CalibrationData::new(0.0, FRAC_PI_2, 0.01, 0.01, 0.0, PierSide::East);

        let rate = data.compensated_x_rate(PI / 4.0);
        assert_relative_eq!(rate, 0.01 * (PI / 4.0).cos(), epsilon = 1e-12);

        // Beyond the limit the calibrated rate is used unchanged
        assert_eq!(data.compensated_x_rate(1.3), 0.01);
    }

    #[test]
    fn test_save_and_load() {
        let temp_path = std::env::temp_dir().join("autoguide_test_calibration.json");

        let data = sample();
        data.save(&temp_path).unwrap();
        let loaded = CalibrationData::load(&temp_path).unwrap();

        assert_eq!(loaded, data);

        let _ = std::fs::remove_file(&temp_path);
    }

    #[test]
    fn test_degenerate_calibration_rejected_on_load() {
        let temp_path = std::env::temp_dir().join("autoguide_test_degenerate.json");

        let json = r#"{
            "x_angle": 0.5,
            "y_angle": 0.51,
            "x_rate": 1.0,
            "y_rate": 1.0,
            "declination": 0.0,
            "pier_side": "Unknown"
        }"#;
        std::fs::write(&temp_path, json).unwrap();

        let result = CalibrationData::load(&temp_path);
        assert!(matches!(result, Err(CalibrationFileError::Invalid(_))));

        let _ = std::fs::remove_file(&temp_path);
    }
}
