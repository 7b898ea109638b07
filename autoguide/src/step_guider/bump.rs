//! Mount bumping
//!
//! A step guider has little travel. When its running offset leaves the
//! central bump zone, the mount is moved ("bumped") by the camera vector that
//! would let the step guider return to center. The bump is spread over
//! several frames, at most `bump_max_steps_per_cycle` step-equivalents per
//! frame, and grows while the offset keeps drifting outward.

use guide_math::{AxisTransform, Point2D};

use crate::error::ActuatorResult;

/// Weight of the newest sample in the running average offset
const AVERAGE_WEIGHT: f64 = 0.25;
/// Pending bump components below this many pixels count as done
const BUMP_EPSILON: f64 = 0.01;

/// What the mount is doing when the step guider moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStatus {
    /// No mount in the session
    Absent,
    Idle,
    /// Mount still has moves queued
    Busy,
}

/// Outcome of one bump update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BumpAction {
    None,
    /// Schedule this camera vector on the mount as a non-normal move
    Schedule(Point2D),
    /// The pending bump has been fully issued
    Finished,
}

/// Step offset and bump zone at the time of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpZone {
    pub x_offset: i32,
    pub y_offset: i32,
    /// Largest |x_offset| inside the zone
    pub x_limit: i32,
    /// Largest |y_offset| inside the zone
    pub y_limit: i32,
}

impl BumpZone {
    pub fn is_outside(&self) -> bool {
        self.x_offset.abs() > self.x_limit || self.y_offset.abs() > self.y_limit
    }
}

#[derive(Debug, Clone)]
pub struct BumpController {
    avg_offset: Point2D,
    remaining: Point2D,
    step_weight: f64,
    max_steps_per_cycle: f64,
}

impl BumpController {
    pub fn new(max_steps_per_cycle: f64) -> Self {
        Self {
            avg_offset: Point2D::invalid(),
            remaining: Point2D::invalid(),
            step_weight: 1.0,
            max_steps_per_cycle,
        }
    }

    pub fn set_max_steps_per_cycle(&mut self, max_steps_per_cycle: f64) {
        self.max_steps_per_cycle = max_steps_per_cycle;
    }

    /// Running average step offset, invalid before the first move
    pub fn average_offset(&self) -> Point2D {
        self.avg_offset
    }

    /// Camera vector still to be issued, `None` when no bump is in progress
    pub fn remaining(&self) -> Option<Point2D> {
        self.remaining.is_valid().then_some(self.remaining)
    }

    pub fn is_bumping(&self) -> bool {
        self.remaining.is_valid()
    }

    pub fn step_weight(&self) -> f64 {
        self.step_weight
    }

    /// Forget all bump state
    pub fn reset(&mut self) {
        self.avg_offset.invalidate();
        self.remaining.invalidate();
        self.step_weight = 1.0;
    }

    /// Update after every step guider move
    ///
    /// `transform` is the step guider's own calibration; it turns the
    /// averaged step offset into the camera vector the mount has to cover.
    pub fn update(
        &mut self,
        zone: &BumpZone,
        transform: &AxisTransform,
        normal_move: bool,
        primary: PrimaryStatus,
    ) -> ActuatorResult<BumpAction> {
        let offset = Point2D::new(f64::from(zone.x_offset), f64::from(zone.y_offset));
        if self.avg_offset.is_valid() {
            self.avg_offset += (offset - self.avg_offset) * AVERAGE_WEIGHT;
        } else {
            self.avg_offset = offset;
        }

        if normal_move && primary != PrimaryStatus::Absent {
            let outside = zone.is_outside();

            if outside && self.remaining.is_valid() {
                log::debug!(
                    "outside bump range, increase bump weight {:.2} => {:.2}",
                    self.step_weight,
                    self.step_weight + 1.0
                );
                self.step_weight += 1.0;
            }

            if !outside && self.step_weight > 1.0 {
                let prior = self.step_weight;
                self.step_weight = (self.step_weight * 0.5).max(1.0);
                log::debug!(
                    "back inside bump range, decrease bump weight {prior:.2} => {:.2}",
                    self.step_weight
                );
            }

            if outside {
                let mount_vector = Point2D::new(
                    transform.x_rate() * -self.avg_offset.x,
                    transform.y_rate() * -self.avg_offset.y,
                );
                self.remaining = transform.mount_to_camera(&mount_vector)?;
                log::debug!(
                    "starting a new bump ({:.3}, {:.3})",
                    self.remaining.x,
                    self.remaining.y
                );
            }
        }

        if !self.remaining.is_valid() {
            return Ok(BumpAction::None);
        }

        match primary {
            PrimaryStatus::Absent => return Ok(BumpAction::None),
            PrimaryStatus::Busy => {
                log::debug!("mount is busy, cannot bump");
                return Ok(BumpAction::None);
            }
            PrimaryStatus::Idle => {}
        }

        let x = bump_component(
            self.remaining.x,
            self.max_steps_per_cycle * transform.x_rate() * self.step_weight,
        );
        let y = bump_component(
            self.remaining.y,
            self.max_steps_per_cycle * transform.y_rate() * self.step_weight,
        );

        if x.is_none() && y.is_none() {
            log::debug!("mount bump finished");
            self.remaining.invalidate();
            return Ok(BumpAction::Finished);
        }

        let bump = Point2D::new(x.unwrap_or(0.0), y.unwrap_or(0.0));
        self.remaining -= bump;
        log::debug!(
            "scheduling mount bump of ({:.3}, {:.3}), remaining ({:.3}, {:.3})",
            bump.x,
            bump.y,
            self.remaining.x,
            self.remaining.y
        );
        Ok(BumpAction::Schedule(bump))
    }
}

/// Clamp one camera component to the per-frame limit
fn bump_component(remaining: f64, max_pixels: f64) -> Option<f64> {
    if remaining.abs() < BUMP_EPSILON {
        return None;
    }
    Some(remaining.clamp(-max_pixels, max_pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn transform() -> AxisTransform {
        // Left steps move the star +x, Down steps move it +y, 0.5 px/step
        AxisTransform::new(0.0, FRAC_PI_2, 0.5, 0.5).unwrap()
    }

    fn zone(x_offset: i32, y_offset: i32) -> BumpZone {
        BumpZone {
            x_offset,
            y_offset,
            x_limit: 36,
            y_limit: 36,
        }
    }

    #[test]
    fn test_inside_zone_schedules_nothing() {
        let mut bump = BumpController::new(1.0);
        let action = bump
            .update(&zone(10, -10), &transform(), true, PrimaryStatus::Idle)
            .unwrap();

        assert_eq!(action, BumpAction::None);
        assert!(!bump.is_bumping());
        assert_relative_eq!(bump.average_offset().x, 10.0);
    }

    #[test]
    fn test_outside_starts_bump_toward_center() {
        let mut bump = BumpController::new(1.0);
        let action = bump
            .update(&zone(40, 0), &transform(), true, PrimaryStatus::Idle)
            .unwrap();

        // Average is 40 steps right; the mount must move the star -20 px
        // along X, clamped to 1 step (0.5 px) this frame
        match action {
            BumpAction::Schedule(v) => {
                assert_relative_eq!(v.x, -0.5, epsilon = 1e-12);
                assert_relative_eq!(v.y, 0.0, epsilon = 1e-12);
            }
            other => panic!("expected a bump, got {other:?}"),
        }
        let remaining = bump.remaining().unwrap();
        assert_relative_eq!(remaining.x, -19.5, epsilon = 1e-12);
    }

    #[test]
    fn test_busy_mount_defers_bump() {
        let mut bump = BumpController::new(1.0);
        bump.update(&zone(40, 0), &transform(), true, PrimaryStatus::Busy)
            .unwrap();

        let before = bump.remaining().unwrap();
        let action = bump
            .update(&zone(30, 0), &transform(), true, PrimaryStatus::Busy)
            .unwrap();
        assert_eq!(action, BumpAction::None);
        assert_eq!(bump.remaining().unwrap(), before);
    }

    #[test]
    fn test_no_mount_never_bumps() {
        let mut bump = BumpController::new(1.0);
        let action = bump
            .update(&zone(44, 44), &transform(), true, PrimaryStatus::Absent)
            .unwrap();
        assert_eq!(action, BumpAction::None);
        assert!(!bump.is_bumping());
    }

    #[test]
    fn test_weight_grows_outside_and_decays_inside() {
        let mut bump = BumpController::new(1.0);
        let t = transform();

        bump.update(&zone(40, 0), &t, true, PrimaryStatus::Idle).unwrap();
        assert_eq!(bump.step_weight(), 1.0);
        bump.update(&zone(40, 0), &t, true, PrimaryStatus::Idle).unwrap();
        bump.update(&zone(40, 0), &t, true, PrimaryStatus::Idle).unwrap();
        assert_eq!(bump.step_weight(), 3.0);

        let mut last = bump.step_weight();
        for _ in 0..5 {
            bump.update(&zone(0, 0), &t, true, PrimaryStatus::Idle).unwrap();
            assert!(bump.step_weight() <= last);
            assert!(bump.step_weight() >= 1.0);
            last = bump.step_weight();
        }
        assert_eq!(bump.step_weight(), 1.0);
    }

    #[test]
    fn test_drained_bump_finishes_once() {
        let mut bump = BumpController::new(100.0);
        let t = transform();

        // Large per-cycle limit: the whole bump goes out in one move
        let first = bump.update(&zone(40, 0), &t, true, PrimaryStatus::Idle).unwrap();
        assert!(matches!(first, BumpAction::Schedule(_)));

        let second = bump.update(&zone(0, 0), &t, true, PrimaryStatus::Idle).unwrap();
        assert_eq!(second, BumpAction::Finished);

        let third = bump.update(&zone(0, 0), &t, true, PrimaryStatus::Idle).unwrap();
        assert_eq!(third, BumpAction::None);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut bump = BumpController::new(1.0);
        bump.update(&zone(40, 0), &transform(), true, PrimaryStatus::Busy)
            .unwrap();
        bump.reset();

        assert!(!bump.is_bumping());
        assert!(!bump.average_offset().is_valid());
        assert_eq!(bump.step_weight(), 1.0);
    }
}
