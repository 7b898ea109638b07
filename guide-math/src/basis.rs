//! Axis bearings and the 2x2 bases built from them
//!
//! A calibrated actuator axis is described by the bearing (radians,
//! counter-clockwise from camera +x) along which it pushes the star. Two
//! such bearings span the camera plane unless they are close to parallel.

use std::f64::consts::{PI, TAU};

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

/// Smallest |determinant| accepted when inverting a basis
const MIN_DETERMINANT: f64 = 1e-10;

/// Basis whose determinant is too small to invert
#[derive(Error, Debug, Clone, PartialEq)]
#[error("basis is singular (determinant {determinant:.3e})")]
pub struct SingularBasisError {
    pub determinant: f64,
}

/// Two axis bearings too close to parallel (or anti-parallel) to span the plane
#[derive(Error, Debug, Clone, PartialEq)]
#[error("axes only {separation_degrees:.2}° apart, need at least {required_degrees:.2}°")]
pub struct ParallelAxesError {
    pub separation_degrees: f64,
    pub required_degrees: f64,
}

/// Wrap a bearing into (-π, π]
pub fn wrap_bearing(bearing: f64) -> f64 {
    let wrapped = bearing.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Unit displacement along a bearing
pub fn bearing_unit(bearing: f64) -> Vector2<f64> {
    let (sin, cos) = bearing.sin_cos();
    Vector2::new(cos, sin)
}

/// Unsigned angle between two bearings, in degrees within [0, 180]
pub fn separation_degrees(a: f64, b: f64) -> f64 {
    wrap_bearing(a - b).abs().to_degrees()
}

/// Basis with the unit vectors of the X and Y bearings as columns
///
/// The bearings need not be perpendicular. They are rejected when closer
/// than `min_separation_degrees` to either parallel or anti-parallel.
pub fn axis_basis(
    x_bearing: f64,
    y_bearing: f64,
    min_separation_degrees: f64,
) -> Result<Matrix2<f64>, ParallelAxesError> {
    let separation = separation_degrees(x_bearing, y_bearing);
    let skew = separation.min(180.0 - separation);
    if skew.is_nan() || skew < min_separation_degrees {
        return Err(ParallelAxesError {
            separation_degrees: separation,
            required_degrees: min_separation_degrees,
        });
    }

    Ok(Matrix2::from_columns(&[
        bearing_unit(x_bearing),
        bearing_unit(y_bearing),
    ]))
}

/// Inverse of a basis, refusing near-singular ones
pub fn invert_basis(basis: &Matrix2<f64>) -> Result<Matrix2<f64>, SingularBasisError> {
    let determinant = basis.determinant();
    if determinant.abs() < MIN_DETERMINANT {
        return Err(SingularBasisError { determinant });
    }

    // Closed form adjugate over determinant
    Ok(Matrix2::new(
        basis[(1, 1)],
        -basis[(0, 1)],
        -basis[(1, 0)],
        basis[(0, 0)],
    ) / determinant)
}

/// Per-axis rate scaling
pub fn axis_rates(x: f64, y: f64) -> Matrix2<f64> {
    Matrix2::from_diagonal(&Vector2::new(x, y))
}
