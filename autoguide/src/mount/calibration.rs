//! Mount calibration state machine
//!
//! ```text
//! Cleared -> GoWest -> GoEast -> ClearBacklash -> GoNorth -> GoSouth -> Complete
//!                        |                                      ^
//!                        +---------- (Dec guiding off) ---------+
//! ```
//!
//! Each frame runs [`MountCalibrator::update`], which applies the transition
//! function repeatedly until a state schedules a pulse or stays put, so a
//! phase that finishes hands the same frame to the next phase.

use guide_math::Point2D;

use crate::actuator::{CalibrationEvent, CalibrationMove, CalibrationProgress};
use crate::direction::{DecGuideMode, GuideDirection};
use crate::error::{ActuatorError, ActuatorResult};

/// Pulses allowed per measuring phase
pub const MAX_CALIBRATION_STEPS: usize = 60;
/// Upper bound on the star travel required per axis (pixels)
pub const MAX_CALIBRATION_DISTANCE: f64 = 25.0;
/// North travel (pixels) that counts as Dec backlash cleared
pub const DEC_BACKLASH_DISTANCE: f64 = 3.0;
/// Fraction of the frame height the star must travel per axis
const FRAME_HEIGHT_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountCalibrationState {
    #[default]
    Cleared,
    GoWest,
    GoEast,
    ClearBacklash,
    GoNorth,
    GoSouth,
    Complete,
}

/// Inputs that stay fixed for one frame
#[derive(Debug, Clone, Copy)]
pub struct MountCalibrationParams {
    /// Calibration pulse length (ms)
    pub pulse_ms: f64,
    /// Star travel that ends a measuring phase (pixels)
    pub distance_limit: f64,
    pub dec_guide_mode: DecGuideMode,
}

impl MountCalibrationParams {
    /// Travel limit for a camera of the given height, if known
    pub fn distance_limit_for(frame_height: Option<u32>) -> f64 {
        frame_height
            .map(|height| f64::from(height) * FRAME_HEIGHT_FRACTION)
            .unwrap_or(MAX_CALIBRATION_DISTANCE)
            .min(MAX_CALIBRATION_DISTANCE)
    }
}

/// Measured values, valid once the state machine reaches `Complete`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MountMeasurement {
    pub x_angle: f64,
    pub y_angle: f64,
    pub x_rate: f64,
    pub y_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MountCalibrator {
    state: MountCalibrationState,
    start: Point2D,
    steps: usize,
    measurement: MountMeasurement,
}

type Transition = (MountCalibrationState, Vec<CalibrationMove>);

impl MountCalibrator {
    pub fn state(&self) -> MountCalibrationState {
        self.state
    }

    pub fn is_calibrating(&self) -> bool {
        !matches!(
            self.state,
            MountCalibrationState::Cleared | MountCalibrationState::Complete
        )
    }

    pub fn measurement(&self) -> MountMeasurement {
        self.measurement
    }

    pub fn begin(&mut self, start: Point2D) {
        *self = Self {
            state: MountCalibrationState::GoWest,
            start,
            ..Self::default()
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by one frame
    ///
    /// On error the calibrator is left untouched; the owner clears it.
    pub fn update(
        &mut self,
        current: &Point2D,
        params: &MountCalibrationParams,
    ) -> ActuatorResult<CalibrationProgress> {
        if !self.is_calibrating() {
            return Err(ActuatorError::NotCalibrating);
        }

        let mut progress = CalibrationProgress::default();
        loop {
            let (next, moves) = self.transition(current, params, &mut progress.events)?;
            let settled = !moves.is_empty() || next == self.state;
            if next != self.state {
                log::debug!("mount calibration {:?} -> {:?}", self.state, next);
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
        params: &MountCalibrationParams,
        events: &mut Vec<CalibrationEvent>,
    ) -> ActuatorResult<Transition> {
        use MountCalibrationState as S;

        match self.state {
            S::Cleared => Err(ActuatorError::NotCalibrating),
            S::GoWest => {
                // The first frame is the reference
                if self.steps == 0 {
                    self.start = *current;
                }
                if self.start.distance(current) < params.distance_limit {
                    return self.measure_step(
                        "RA",
                        "West",
                        GuideDirection::WEST,
                        current,
                        params,
                        events,
                    );
                }
                let (angle, rate) = self.finish_axis(self.start.angle(current), current, params);
                self.measurement.x_angle = angle;
                self.measurement.x_rate = rate;
                events.push(CalibrationEvent::DirectionComplete {
                    phase: "West",
                    angle,
                    rate,
                });
                log::info!("West calibration complete: angle={angle:.2} rate={rate:.4}");
                Ok((S::GoEast, Vec::new()))
            }
            S::GoEast => {
                if self.steps > 0 {
                    let moves =
                        self.replay_step("East", GuideDirection::EAST, current, params, events);
                    return Ok((S::GoEast, moves));
                }
                self.start = *current;

                if params.dec_guide_mode == DecGuideMode::None {
                    self.measurement.y_angle = 0.0;
                    self.measurement.y_rate = 1.0;
                    log::info!("Dec guiding off, skipping Dec calibration");
                    return Ok((S::Complete, Vec::new()));
                }
                Ok((S::ClearBacklash, Vec::new()))
            }
            S::ClearBacklash => {
                if self.start.distance(current) < DEC_BACKLASH_DISTANCE {
                    return self.measure_step(
                        "Backlash",
                        "Backlash",
                        GuideDirection::NORTH,
                        current,
                        params,
                        events,
                    );
                }
                log::info!("Dec backlash cleared after {} steps", self.steps);
                self.steps = 0;
                self.start = *current;
                Ok((S::GoNorth, Vec::new()))
            }
            S::GoNorth => {
                if self.start.distance(current) < params.distance_limit {
                    return self.measure_step(
                        "Dec",
                        "North",
                        GuideDirection::NORTH,
                        current,
                        params,
                        events,
                    );
                }
                // Reversed: Y is expressed as the bearing of southward motion
                let (angle, rate) = self.finish_axis(current.angle(&self.start), current, params);
                self.measurement.y_angle = angle;
                self.measurement.y_rate = rate;
                events.push(CalibrationEvent::DirectionComplete {
                    phase: "North",
                    angle,
                    rate,
                });
                log::info!("North calibration complete: angle={angle:.2} rate={rate:.4}");
                Ok((S::GoSouth, Vec::new()))
            }
            S::GoSouth => {
                if self.steps > 0 {
                    let moves =
                        self.replay_step("South", GuideDirection::SOUTH, current, params, events);
                    return Ok((S::GoSouth, moves));
                }
                Ok((S::Complete, Vec::new()))
            }
            S::Complete => Ok((S::Complete, Vec::new())),
        }
    }

    /// Schedule one more pulse of a measuring phase, enforcing the step cap
    fn measure_step(
        &mut self,
        failure_phase: &'static str,
        phase: &'static str,
        direction: GuideDirection,
        current: &Point2D,
        params: &MountCalibrationParams,
        events: &mut Vec<CalibrationEvent>,
    ) -> ActuatorResult<Transition> {
        if self.steps >= MAX_CALIBRATION_STEPS {
            log::warn!("{failure_phase} calibration failed after {} steps", self.steps);
            return Err(ActuatorError::InsufficientMotion {
                phase: failure_phase,
                steps: self.steps,
            });
        }
        self.steps += 1;
        self.push_step(phase, direction, current, events);
        Ok((self.state, vec![CalibrationMove::new(direction, params.pulse_ms)]))
    }

    /// Schedule one return pulse, counting down the measured steps
    fn replay_step(
        &mut self,
        phase: &'static str,
        direction: GuideDirection,
        current: &Point2D,
        params: &MountCalibrationParams,
        events: &mut Vec<CalibrationEvent>,
    ) -> Vec<CalibrationMove> {
        self.push_step(phase, direction, current, events);
        self.steps -= 1;
        vec![CalibrationMove::new(direction, params.pulse_ms)]
    }

    fn push_step(
        &self,
        phase: &'static str,
        direction: GuideDirection,
        current: &Point2D,
        events: &mut Vec<CalibrationEvent>,
    ) {
        let distance = self.start.distance(current);
        log::debug!("{phase} step {} dist={distance:.2}", self.steps);
        events.push(CalibrationEvent::Step {
            phase,
            direction,
            step: self.steps,
            dx: self.start.dx(current),
            dy: self.start.dy(current),
            distance,
        });
    }

    fn finish_axis(
        &self,
        angle: f64,
        current: &Point2D,
        params: &MountCalibrationParams,
    ) -> (f64, f64) {
        let distance = self.start.distance(current);
        let rate = distance / (self.steps as f64 * params.pulse_ms);
        (angle, rate)
    }
}
