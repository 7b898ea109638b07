//! Axis transform - change of basis between camera pixels and actuator axes
//!
//! Calibration measures, for each actuator axis, the bearing along which the
//! star moves on the detector and the rate (pixels per command unit). Those
//! two bearings form a basis of the camera plane that is generally not
//! orthogonal, so the transform uses a full 2x2 inverse rather than a
//! rotation.
//!
//! # Coordinate System
//!
//! ```text
//! camera_delta = basis * mount_delta
//! mount_delta  = rates ⊙ actuator_units
//! ```
//!
//! Where:
//! - `basis` has the unit vectors of the X and Y bearings as columns
//! - `mount_delta` is the displacement in pixels along each actuator axis
//! - `actuator_units` is the command (milliseconds or steps) on each axis

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use crate::basis::{axis_basis, axis_rates, invert_basis, ParallelAxesError, SingularBasisError};
use crate::point::Point2D;

/// Minimum angle (degrees) between calibrated axes for a usable transform
pub const MIN_AXIS_ANGLE_DEGREES: f64 = 5.0;

/// Error building or applying an axis transform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The input point carries no coordinate meaning
    #[error("point is not valid")]
    InvalidPoint,

    /// Rates must be finite and strictly positive
    #[error("invalid {axis} rate: {rate}")]
    InvalidRate { axis: char, rate: f64 },

    /// Calibrated axes are (nearly) parallel
    #[error("degenerate axes: {0}")]
    DegenerateAxes(#[from] ParallelAxesError),

    /// Basis matrix cannot be inverted
    #[error("singular basis: {0}")]
    SingularMatrix(#[from] SingularBasisError),
}

/// Camera ↔ actuator transform built from per-axis angle and rate
///
/// The basis is validated to be invertible on construction, so the
/// conversion methods only fail on invalid input points.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTransform {
    x_angle: f64,
    y_angle: f64,
    rates: Vector2<f64>,
    basis: Matrix2<f64>,
    inverse: Matrix2<f64>,
}

impl AxisTransform {
    /// Build a transform from calibrated bearings (radians) and rates
    pub fn new(
        x_angle: f64,
        y_angle: f64,
        x_rate: f64,
        y_rate: f64,
    ) -> Result<Self, TransformError> {
        for (axis, rate) in [('x', x_rate), ('y', y_rate)] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(TransformError::InvalidRate { axis, rate });
            }
        }

        let basis = axis_basis(x_angle, y_angle, MIN_AXIS_ANGLE_DEGREES)?;
        let inverse = invert_basis(&basis)?;

        Ok(Self {
            x_angle,
            y_angle,
            rates: Vector2::new(x_rate, y_rate),
            basis,
            inverse,
        })
    }

    pub fn x_angle(&self) -> f64 {
        self.x_angle
    }

    pub fn y_angle(&self) -> f64 {
        self.y_angle
    }

    pub fn x_rate(&self) -> f64 {
        self.rates.x
    }

    pub fn y_rate(&self) -> f64 {
        self.rates.y
    }

    /// Resolve a camera-frame displacement into pixels along each actuator axis
    pub fn camera_to_mount(&self, camera: &Point2D) -> Result<Point2D, TransformError> {
        let v = camera.to_vector().ok_or(TransformError::InvalidPoint)?;
        Ok(Point2D::from_vector(self.inverse * v))
    }

    /// Recombine per-axis pixel displacements into a camera-frame displacement
    pub fn mount_to_camera(&self, mount: &Point2D) -> Result<Point2D, TransformError> {
        let v = mount.to_vector().ok_or(TransformError::InvalidPoint)?;
        Ok(Point2D::from_vector(self.basis * v))
    }

    /// Convert a camera-frame displacement into actuator command units
    pub fn camera_to_actuator_units(&self, camera: &Point2D) -> Result<Point2D, TransformError> {
        let v = camera.to_vector().ok_or(TransformError::InvalidPoint)?;
        let per_unit = axis_rates(1.0 / self.rates.x, 1.0 / self.rates.y);
        Ok(Point2D::from_vector(per_unit * self.inverse * v))
    }

    /// Camera-frame displacement produced by the given actuator commands
    pub fn actuator_units_to_camera(&self, units: &Point2D) -> Result<Point2D, TransformError> {
        let v = units.to_vector().ok_or(TransformError::InvalidPoint)?;
        let rates = axis_rates(self.rates.x, self.rates.y);
        Ok(Point2D::from_vector(self.basis * rates * v))
    }
}
