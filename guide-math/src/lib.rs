//! guide-math - Geometry shared by guider calibration and correction
//!
//! This crate provides the pure math used by the autoguide core:
//!
//! - **Point** - star positions and displacement vectors with a validity flag
//! - **Basis** - bearings, axis bases and their inverses
//! - **Transform** - change of basis between camera pixels and actuator axes
//!
//! # Example
//!
//! ```
//! use guide_math::{AxisTransform, Point2D};
//!
//! # fn main() -> Result<(), guide_math::TransformError> {
//! // X axis moves the star along +x at 0.5 px/ms, Y axis along +y at 0.25 px/ms
//! let transform = AxisTransform::new(0.0, std::f64::consts::FRAC_PI_2, 0.5, 0.25)?;
//!
//! let units = transform.camera_to_actuator_units(&Point2D::new(5.0, 5.0))?;
//! assert!((units.x - 10.0).abs() < 1e-9);
//! assert!((units.y - 20.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

pub mod basis;
pub mod point;
pub mod transform;

pub use basis::{
    axis_basis, axis_rates, bearing_unit, invert_basis, separation_degrees, wrap_bearing,
    ParallelAxesError, SingularBasisError,
};
pub use point::Point2D;
pub use transform::{AxisTransform, TransformError, MIN_AXIS_ANGLE_DEGREES};
