//! Step guider calibration state machine
//!
//! The unit is assumed to start centered. It is driven into the lower right
//! corner, swept left across its full travel to measure X, swept up across
//! its full travel to measure Y, and finally returned to center. Each
//! reference point is the average of several frames.

use guide_math::Point2D;

use crate::actuator::{CalibrationEvent, CalibrationMove, CalibrationProgress};
use crate::direction::GuideDirection;
use crate::error::{ActuatorError, ActuatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepGuiderCalibrationState {
    #[default]
    Cleared,
    GotoLowerRightCorner,
    AverageStartingLocation,
    GoLeft,
    AverageCenterLocation,
    GoUp,
    AverageEndingLocation,
    Recenter,
    Complete,
}

/// Step offsets and travel limits at the start of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Travel {
    pub x_offset: i32,
    pub y_offset: i32,
    pub max_up: i32,
    pub max_down: i32,
    pub max_right: i32,
    pub max_left: i32,
}

impl Travel {
    /// Signed offset measured in `direction`
    pub fn current_position(&self, direction: GuideDirection) -> i32 {
        match direction {
            GuideDirection::Up => self.y_offset,
            GuideDirection::Down => -self.y_offset,
            GuideDirection::Right => self.x_offset,
            GuideDirection::Left => -self.x_offset,
            GuideDirection::None => 0,
        }
    }

    pub fn max_position(&self, direction: GuideDirection) -> i32 {
        match direction {
            GuideDirection::Up => self.max_up,
            GuideDirection::Down => self.max_down,
            GuideDirection::Right => self.max_right,
            GuideDirection::Left => self.max_left,
            GuideDirection::None => 0,
        }
    }

    /// Whole calibration iterations that fit before the travel limit
    pub fn usable_iterations(&self, direction: GuideDirection, steps_per_iteration: i32) -> i32 {
        let remaining = self.max_position(direction) - 1 - self.current_position(direction);
        remaining.max(0) / steps_per_iteration
    }

    /// Iterations needed to cross the full travel, plus slack
    pub fn derived_iteration_cap(&self, steps_per_iteration: i32) -> usize {
        let widest = self
            .max_up
            .max(self.max_down)
            .max(self.max_right)
            .max(self.max_left);
        (2 * widest / steps_per_iteration + 2).max(1) as usize
    }
}

/// Inputs that stay fixed for one frame
#[derive(Debug, Clone, Copy)]
pub struct StepGuiderCalibrationParams {
    pub steps_per_iteration: i32,
    pub samples_to_average: usize,
    pub min_distance: f64,
    pub iteration_cap: usize,
}

/// Measured values, valid once the state machine reaches `Complete`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepGuiderMeasurement {
    pub x_angle: f64,
    pub y_angle: f64,
    pub x_rate: f64,
    pub y_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StepGuiderCalibrator {
    state: StepGuiderCalibrationState,
    start: Point2D,
    sample_sum: Point2D,
    samples: usize,
    iterations: usize,
    measurement: StepGuiderMeasurement,
}

type Transition = (StepGuiderCalibrationState, Vec<CalibrationMove>);

impl StepGuiderCalibrator {
    pub fn state(&self) -> StepGuiderCalibrationState {
        self.state
    }

    pub fn is_calibrating(&self) -> bool {
        !matches!(
            self.state,
            StepGuiderCalibrationState::Cleared | StepGuiderCalibrationState::Complete
        )
    }

    pub fn measurement(&self) -> StepGuiderMeasurement {
        self.measurement
    }

    pub fn begin(&mut self, start: Point2D) {
        *self = Self {
            state: StepGuiderCalibrationState::GotoLowerRightCorner,
            start,
            ..Self::default()
        };
    }

    /// Back to `Cleared`, dropping any averaging buffer
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by one frame
    ///
    /// On error the calibrator is left untouched; the owner clears it.
    pub fn update(
        &mut self,
        current: &Point2D,
        travel: &Travel,
        params: &StepGuiderCalibrationParams,
    ) -> ActuatorResult<CalibrationProgress> {
        if !self.is_calibrating() {
            return Err(ActuatorError::NotCalibrating);
        }

        let mut progress = CalibrationProgress::default();
        loop {
            let (next, moves) = self.transition(current, travel, params, &mut progress.events)?;
            let settled = !moves.is_empty() || next == self.state;
            if next != self.state {
                log::debug!(
                    "step guider calibration {:?} -> {:?} at ({:.2}, {:.2})",
                    self.state,
                    next,
                    current.x,
                    current.y
                );
            }
            self.state = next;
            progress.moves.extend(moves);
            if settled {
                break;
            }
        }

        Ok(progress)
    }

    fn transition(
        &mut self,
        current: &Point2D,
        travel: &Travel,
        params: &StepGuiderCalibrationParams,
        events: &mut Vec<CalibrationEvent>,
    ) -> ActuatorResult<Transition> {
        use StepGuiderCalibrationState as S;

        let spi = params.steps_per_iteration;
        let amount = f64::from(spi);

        match self.state {
            S::Cleared => Err(ActuatorError::NotCalibrating),
            S::GotoLowerRightCorner => {
                let down = travel.usable_iterations(GuideDirection::Down, spi);
                let right = travel.usable_iterations(GuideDirection::Right, spi);
                if down.max(right) > 0 {
                    self.count_iteration("Initialization", params)?;
                    let mut moves = Vec::with_capacity(2);
                    if down > 0 {
                        moves.push(CalibrationMove::new(GuideDirection::Down, amount));
                    }
                    if right > 0 {
                        moves.push(CalibrationMove::new(GuideDirection::Right, amount));
                    }
                    return Ok((S::GotoLowerRightCorner, moves));
                }
                self.start_averaging();
                Ok((S::AverageStartingLocation, Vec::new()))
            }
            S::AverageStartingLocation => {
                let Some(average) = self.accumulate(current, params) else {
                    return Ok((S::AverageStartingLocation, Vec::new()));
                };
                self.start = average;
                self.iterations = 0;
                Ok((S::GoLeft, Vec::new()))
            }
            S::GoLeft => {
                if travel.usable_iterations(GuideDirection::Left, spi) > 0 {
                    self.count_iteration("Left", params)?;
                    self.push_step("Left", GuideDirection::Left, current, events);
                    let step = CalibrationMove::new(GuideDirection::Left, amount);
                    return Ok((S::GoLeft, vec![step]));
                }
                self.start_averaging();
                Ok((S::AverageCenterLocation, Vec::new()))
            }
            S::AverageCenterLocation => {
                let Some(center) = self.accumulate(current, params) else {
                    return Ok((S::AverageCenterLocation, Vec::new()));
                };
                let rate = self.sweep_rate("Left", &center, params)?;
                let angle = self.start.angle(&center);
                self.measurement.x_angle = angle;
                self.measurement.x_rate = rate;
                events.push(CalibrationEvent::DirectionComplete {
                    phase: "Left",
                    angle,
                    rate,
                });
                log::info!("Left calibration complete: angle={angle:.2} rate={rate:.4}");

                self.start = center;
                self.iterations = 0;
                Ok((S::GoUp, Vec::new()))
            }
            S::GoUp => {
                if travel.usable_iterations(GuideDirection::Up, spi) > 0 {
                    self.count_iteration("Up", params)?;
                    self.push_step("Up", GuideDirection::Up, current, events);
                    let step = CalibrationMove::new(GuideDirection::Up, amount);
                    return Ok((S::GoUp, vec![step]));
                }
                self.start_averaging();
                Ok((S::AverageEndingLocation, Vec::new()))
            }
            S::AverageEndingLocation => {
                let Some(end) = self.accumulate(current, params) else {
                    return Ok((S::AverageEndingLocation, Vec::new()));
                };
                let rate = self.sweep_rate("Up", &end, params)?;
                // Reversed: Y is expressed as the bearing of downward motion
                let angle = end.angle(&self.start);
                self.measurement.y_angle = angle;
                self.measurement.y_rate = rate;
                events.push(CalibrationEvent::DirectionComplete {
                    phase: "Up",
                    angle,
                    rate,
                });
                log::info!("Up calibration complete: angle={angle:.2} rate={rate:.4}");

                self.start = end;
                self.iterations = 0;
                Ok((S::Recenter, Vec::new()))
            }
            S::Recenter => {
                let mut moves = Vec::with_capacity(2);
                moves.extend(recenter_move(travel.x_offset, GuideDirection::Left, spi));
                moves.extend(recenter_move(travel.y_offset, GuideDirection::Down, spi));
                if moves.is_empty() {
                    return Ok((S::Complete, Vec::new()));
                }
                self.count_iteration("Recenter", params)?;
                Ok((S::Recenter, moves))
            }
            S::Complete => Ok((S::Complete, Vec::new())),
        }
    }

    fn count_iteration(
        &mut self,
        phase: &'static str,
        params: &StepGuiderCalibrationParams,
    ) -> ActuatorResult<()> {
        if self.iterations >= params.iteration_cap {
            log::warn!("{phase} calibration failed after {} iterations", self.iterations);
            return Err(ActuatorError::InsufficientMotion {
                phase,
                steps: self.iterations,
            });
        }
        self.iterations += 1;
        Ok(())
    }

    fn start_averaging(&mut self) {
        self.samples = 0;
        self.sample_sum = Point2D::origin();
    }

    /// Add one sample; the average once enough have been collected
    fn accumulate(
        &mut self,
        current: &Point2D,
        params: &StepGuiderCalibrationParams,
    ) -> Option<Point2D> {
        self.samples += 1;
        self.sample_sum += *current;
        if self.samples < params.samples_to_average {
            return None;
        }
        Some(self.sample_sum / self.samples as f64)
    }

    fn sweep_rate(
        &self,
        phase: &'static str,
        end: &Point2D,
        params: &StepGuiderCalibrationParams,
    ) -> ActuatorResult<f64> {
        let distance = self.start.distance(end);
        log::debug!(
            "{phase} sweep distance={distance:.2} iterations={}",
            self.iterations
        );
        if self.iterations == 0 || distance < params.min_distance {
            return Err(ActuatorError::InsufficientMotion {
                phase,
                steps: self.iterations * params.steps_per_iteration as usize,
            });
        }
        Ok(distance / (self.iterations as f64 * f64::from(params.steps_per_iteration)))
    }

    fn push_step(
        &self,
        phase: &'static str,
        direction: GuideDirection,
        current: &Point2D,
        events: &mut Vec<CalibrationEvent>,
    ) {
        events.push(CalibrationEvent::Step {
            phase,
            direction,
            step: self.iterations,
            dx: self.start.dx(current),
            dy: self.start.dy(current),
            distance: self.start.distance(current),
        });
    }
}

/// Move one axis back toward zero offset, at most one iteration's worth
///
/// `decrease` is the direction that lowers a positive offset.
fn recenter_move(
    offset: i32,
    decrease: GuideDirection,
    steps_per_iteration: i32,
) -> Option<CalibrationMove> {
    let steps = f64::from(offset.abs().min(steps_per_iteration));
    match offset.signum() {
        1 => Some(CalibrationMove::new(decrease, steps)),
        -1 => Some(CalibrationMove::new(decrease.opposite(), steps)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn travel(x_offset: i32, y_offset: i32, max: i32) -> Travel {
        Travel {
            x_offset,
            y_offset,
            max_up: max,
            max_down: max,
            max_right: max,
            max_left: max,
        }
    }

    fn params() -> StepGuiderCalibrationParams {
        StepGuiderCalibrationParams {
            steps_per_iteration: 4,
            samples_to_average: 3,
            min_distance: 1.0,
            iteration_cap: 24,
        }
    }

    #[test]
    fn test_usable_iterations_stop_short_of_limit() {
        let t = travel(0, 0, 45);
        assert_eq!(t.usable_iterations(GuideDirection::Down, 4), 11);

        let t = travel(44, -44, 45);
        assert_eq!(t.usable_iterations(GuideDirection::Right, 4), 0);
        assert_eq!(t.usable_iterations(GuideDirection::Left, 4), 22);
        assert_eq!(t.usable_iterations(GuideDirection::Up, 4), 22);
    }

    #[test]
    fn test_derived_cap() {
        assert_eq!(travel(0, 0, 45).derived_iteration_cap(4), 24);
    }

    #[test]
    fn test_recenter_move_reaches_zero() {
        // Negative x is left of center
        assert_eq!(
            recenter_move(-6, GuideDirection::Left, 4),
            Some(CalibrationMove::new(GuideDirection::Right, 4.0))
        );
        assert_eq!(
            recenter_move(3, GuideDirection::Left, 4),
            Some(CalibrationMove::new(GuideDirection::Left, 3.0))
        );
        // Positive y is above center
        assert_eq!(
            recenter_move(5, GuideDirection::Down, 4),
            Some(CalibrationMove::new(GuideDirection::Down, 4.0))
        );
        assert_eq!(recenter_move(0, GuideDirection::Left, 4), None);
    }

    #[test]
    fn test_corner_seek_moves_down_and_right() {
        let mut calibrator = StepGuiderCalibrator::default();
        calibrator.begin(Point2D::new(50.0, 50.0));

        let progress = calibrator
            .update(&Point2D::new(50.0, 50.0), &travel(0, 0, 45), &params())
            .unwrap();
        assert_eq!(
            progress.moves,
            vec![
                CalibrationMove::new(GuideDirection::Down, 4.0),
                CalibrationMove::new(GuideDirection::Right, 4.0),
            ]
        );
    }

    #[test]
    fn test_averaging_starts_on_arrival_frame() {
        let mut calibrator = StepGuiderCalibrator::default();
        calibrator.begin(Point2D::new(0.0, 0.0));
        let corner = travel(44, -44, 45);

        // Arrival frame falls through into averaging as sample one
        calibrator.update(&Point2D::new(1.0, 0.0), &corner, &params()).unwrap();
        assert_eq!(
            calibrator.state(),
            StepGuiderCalibrationState::AverageStartingLocation
        );
        calibrator.update(&Point2D::new(2.0, 0.0), &corner, &params()).unwrap();

        // Third sample completes the average and the first Left step goes out
        let progress = calibrator
            .update(&Point2D::new(3.0, 0.0), &corner, &params())
            .unwrap();
        assert_eq!(calibrator.state(), StepGuiderCalibrationState::GoLeft);
        assert_eq!(
            progress.moves,
            vec![CalibrationMove::new(GuideDirection::Left, 4.0)]
        );
        assert_relative_eq!(calibrator.start.x, 2.0);
    }

    #[test]
    fn test_stuck_sweep_hits_iteration_cap() {
        let mut calibrator = StepGuiderCalibrator::default();
        calibrator.begin(Point2D::new(0.0, 0.0));
        let corner = travel(44, -44, 45);
        let star = Point2D::new(0.0, 0.0);

        let mut result = Ok(CalibrationProgress::default());
        for _ in 0..40 {
            // Offsets never change: the unit does not move
            result = calibrator.update(&star, &corner, &params());
            if result.is_err() {
                break;
            }
        }

        assert_eq!(
            result,
            Err(ActuatorError::InsufficientMotion {
                phase: "Left",
                steps: 24
            })
        );
    }
}
