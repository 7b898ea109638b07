//! Star positions and displacement vectors
//!
//! A [`Point2D`] is either a position (a centroid in camera pixels) or a
//! displacement (camera or mount frame). Points produced by a failed
//! measurement are invalid and carry no coordinate meaning; arithmetic that
//! touches an invalid point yields an invalid point.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// 2-D position or offset with a validity flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
    valid: bool,
}

impl Default for Point2D {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Point2D {
    /// Create a valid point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, valid: true }
    }

    /// Valid point at the origin
    pub fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Point with no coordinate meaning
    pub fn invalid() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Overwrite both coordinates and mark the point valid
    pub fn set(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.valid = true;
    }

    /// X displacement from `self` to `other`
    pub fn dx(&self, other: &Point2D) -> f64 {
        other.x - self.x
    }

    /// Y displacement from `self` to `other`
    pub fn dy(&self, other: &Point2D) -> f64 {
        other.y - self.y
    }

    /// Euclidean distance from `self` to `other`
    pub fn distance(&self, other: &Point2D) -> f64 {
        self.dx(other).hypot(self.dy(other))
    }

    /// Bearing of the vector from `self` to `other`, in radians
    ///
    /// Coincident points have a bearing of zero.
    pub fn angle(&self, other: &Point2D) -> f64 {
        let dx = self.dx(other);
        let dy = self.dy(other);

        if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            dy.atan2(dx)
        }
    }

    /// Length of the vector from the origin to this point
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Bearing of the vector from the origin to this point
    pub fn bearing(&self) -> f64 {
        Point2D::origin().angle(self)
    }

    /// Coordinates as an nalgebra vector, `None` for invalid points
    pub fn to_vector(&self) -> Option<Vector2<f64>> {
        self.valid.then(|| Vector2::new(self.x, self.y))
    }

    pub fn from_vector(v: Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }
}

impl Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            valid: self.valid && rhs.valid,
        }
    }
}

impl Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            valid: self.valid && rhs.valid,
        }
    }
}

impl AddAssign for Point2D {
    fn add_assign(&mut self, rhs: Point2D) {
        *self = *self + rhs;
    }
}

impl SubAssign for Point2D {
    fn sub_assign(&mut self, rhs: Point2D) {
        *self = *self - rhs;
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, rhs: f64) -> Point2D {
        Point2D {
            x: self.x * rhs,
            y: self.y * rhs,
            valid: self.valid,
        }
    }
}

impl Div<f64> for Point2D {
    type Output = Point2D;

    fn div(self, rhs: f64) -> Point2D {
        Point2D {
            x: self.x / rhs,
            y: self.y / rhs,
            valid: self.valid,
        }
    }
}

impl Neg for Point2D {
    type Output = Point2D;

    fn neg(self) -> Point2D {
        Point2D {
            x: -self.x,
            y: -self.y,
            valid: self.valid,
        }
    }
}
