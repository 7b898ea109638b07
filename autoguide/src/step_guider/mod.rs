//! Step guider (secondary actuator)
//!
//! A fast unit with a few dozen steps of travel each way from center. It
//! keeps its own running step offset, truncates moves at the travel limit,
//! and asks the mount for bumps when it drifts away from center.

pub mod bump;
pub mod calibration;

use guide_math::Point2D;

use crate::actuator::{Actuator, ActuatorCore, CalibrationProgress};
use crate::calibration::CalibrationData;
use crate::config::StepGuiderConfig;
use crate::device::StepDevice;
use crate::direction::{ActuatorKind, GuideDirection, PierSide};
use crate::error::{ActuatorError, ActuatorResult, DeviceError};

pub use bump::{BumpAction, BumpController, BumpZone, PrimaryStatus};
pub use calibration::{
    StepGuiderCalibrationParams, StepGuiderCalibrationState, StepGuiderCalibrator, Travel,
};

/// Adaptive-optics style step guider
pub struct StepGuider {
    core: ActuatorCore,
    config: StepGuiderConfig,
    device: Box<dyn StepDevice + Send>,
    x_offset: i32,
    y_offset: i32,
    calibrator: StepGuiderCalibrator,
    bump: BumpController,
}

impl StepGuider {
    /// Create a disconnected step guider; invalid settings fall back to defaults
    pub fn new(
        name: impl Into<String>,
        device: Box<dyn StepDevice + Send>,
        config: StepGuiderConfig,
    ) -> Self {
        let config = config.sanitized();
        Self {
            core: ActuatorCore::new(name),
            bump: BumpController::new(config.bump_max_steps_per_cycle),
            config,
            device,
            x_offset: 0,
            y_offset: 0,
            calibrator: StepGuiderCalibrator::default(),
        }
    }

    pub fn config(&self) -> &StepGuiderConfig {
        &self.config
    }

    /// Replace the settings, rejecting invalid ones
    pub fn set_config(&mut self, config: StepGuiderConfig) -> ActuatorResult<()> {
        config.validate()?;
        self.bump
            .set_max_steps_per_cycle(config.bump_max_steps_per_cycle);
        self.config = config;
        Ok(())
    }

    pub fn calibration_state(&self) -> StepGuiderCalibrationState {
        self.calibrator.state()
    }

    pub fn bump_controller(&self) -> &BumpController {
        &self.bump
    }

    /// Running step offset `(x, y)`; positive is Right and Up
    pub fn offsets(&self) -> (i32, i32) {
        (self.x_offset, self.y_offset)
    }

    /// Signed offset measured in `direction`
    pub fn current_position(&self, direction: GuideDirection) -> i32 {
        self.travel().current_position(direction)
    }

    pub fn max_position(&self, direction: GuideDirection) -> i32 {
        self.device.max_position(direction)
    }

    /// Offset beyond which the mount gets bumped
    pub fn bump_position(&self, direction: GuideDirection) -> i32 {
        integer_percent(self.config.bump_percentage, self.max_position(direction))
    }

    pub fn would_hit_limit(&self, direction: GuideDirection, steps: i32) -> bool {
        let hit =
            self.current_position(direction).saturating_add(steps) >= self.max_position(direction);
        log::debug!(
            "would_hit_limit={} current={} steps={} max={}",
            hit,
            self.current_position(direction),
            steps,
            self.max_position(direction)
        );
        hit
    }

    /// Sitting on the last usable step in `direction`
    pub fn is_at_limit(&self, direction: GuideDirection) -> bool {
        self.current_position(direction) == self.max_position(direction) - 1
    }

    /// Declare the current position to be center
    pub fn zero_current_position(&mut self) {
        self.x_offset = 0;
        self.y_offset = 0;
    }

    /// Step both axes back to zero offset
    pub fn move_to_center(&mut self) -> ActuatorResult<()> {
        if !self.core.guiding_enabled() {
            log::debug!("{}: guiding disabled, not recentering", self.core.name());
            return Ok(());
        }

        let (x, y) = self.offsets();
        let moves = [
            (if y > 0 { GuideDirection::Down } else { GuideDirection::Up }, y.abs()),
            (if x > 0 { GuideDirection::Left } else { GuideDirection::Right }, x.abs()),
        ];

        for (direction, steps) in moves {
            if steps == 0 {
                continue;
            }
            let applied = self.move_axis(direction, f64::from(steps), false)?;
            if applied as i32 != steps {
                return Err(DeviceError::Incomplete {
                    requested: f64::from(steps),
                    applied,
                }
                .into());
            }
        }

        log::debug!("{} centered", self.core.name());
        Ok(())
    }

    /// Feed the bump controller after a move has been applied
    pub fn update_bump(
        &mut self,
        normal_move: bool,
        primary: PrimaryStatus,
    ) -> ActuatorResult<BumpAction> {
        let transform = self.transform()?;
        let zone = BumpZone {
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            x_limit: self.bump_position(GuideDirection::Right),
            y_limit: self.bump_position(GuideDirection::Up),
        };
        self.bump.update(&zone, &transform, normal_move, primary)
    }

    fn travel(&self) -> Travel {
        Travel {
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            max_up: self.device.max_position(GuideDirection::Up),
            max_down: self.device.max_position(GuideDirection::Down),
            max_right: self.device.max_position(GuideDirection::Right),
            max_left: self.device.max_position(GuideDirection::Left),
        }
    }

    fn calibration_params(&self, travel: &Travel) -> StepGuiderCalibrationParams {
        let steps_per_iteration = self.config.calibration_steps_per_iteration as i32;
        StepGuiderCalibrationParams {
            steps_per_iteration,
            samples_to_average: self.config.samples_to_average,
            min_distance: self.config.min_calibration_distance,
            iteration_cap: self
                .config
                .max_calibration_iterations
                .unwrap_or_else(|| travel.derived_iteration_cap(steps_per_iteration)),
        }
    }
}

/// `percentage` of `value`, in integer arithmetic
fn integer_percent(percentage: u32, value: i32) -> i32 {
    (i64::from(percentage) * i64::from(value) / 100) as i32
}

impl Actuator for StepGuider {
    fn kind(&self) -> ActuatorKind {
        ActuatorKind::StepGuider
    }

    fn core(&self) -> &ActuatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActuatorCore {
        &mut self.core
    }

    fn connect(&mut self) -> ActuatorResult<()> {
        if self.core.is_connected() {
            return Err(ActuatorError::AlreadyConnected);
        }
        self.device.connect()?;
        self.zero_current_position();
        self.core.set_connected(true);
        log::info!("{} connected", self.core.name());
        Ok(())
    }

    fn disconnect(&mut self) -> ActuatorResult<()> {
        if !self.core.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        if self.calibrator.is_calibrating() {
            log::warn!("{}: disconnect aborts calibration", self.core.name());
            self.calibrator.reset();
        }
        self.bump.reset();
        self.device.disconnect()?;
        self.core.set_connected(false);
        log::info!("{} disconnected", self.core.name());
        Ok(())
    }

    fn begin_calibration(&mut self, start: Point2D) -> ActuatorResult<()> {
        if !self.core.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        if !start.is_valid() {
            return Err(ActuatorError::InvalidStartPosition);
        }

        self.clear_calibration();
        self.calibrator.begin(start);
        log::info!(
            "{}: calibration begins at ({:.2}, {:.2})",
            self.core.name(),
            start.x,
            start.y
        );
        Ok(())
    }

    fn update_calibration_state(
        &mut self,
        current: &Point2D,
    ) -> ActuatorResult<CalibrationProgress> {
        let travel = self.travel();
        let params = self.calibration_params(&travel);

        let mut progress = match self.calibrator.update(current, &travel, &params) {
            Ok(progress) => progress,
            Err(ActuatorError::NotCalibrating) => return Err(ActuatorError::NotCalibrating),
            Err(e) => {
                log::warn!("{}: calibration failed: {e}", self.core.name());
                self.clear_calibration();
                return Err(e);
            }
        };

        if self.calibrator.state() == StepGuiderCalibrationState::Complete {
            let m = self.calibrator.measurement();
            let data = CalibrationData::new(
                m.x_angle,
                m.y_angle,
                m.x_rate,
                m.y_rate,
                0.0,
                PierSide::Unknown,
            );
            self.set_calibration(data);
            log::info!("{}: calibration complete", self.core.name());
            progress.completed = Some(data);
        }

        Ok(progress)
    }

    fn is_calibrating(&self) -> bool {
        self.calibrator.is_calibrating()
    }

    fn move_axis(
        &mut self,
        direction: GuideDirection,
        amount: f64,
        normal_move: bool,
    ) -> ActuatorResult<f64> {
        log::debug!(
            "{} move({}, {:.2}, {})",
            self.core.name(),
            direction.name(ActuatorKind::StepGuider),
            amount,
            normal_move
        );

        if !self.core.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        if !self.core.guiding_enabled() {
            log::debug!("{}: guiding disabled, move ignored", self.core.name());
            return Ok(0.0);
        }

        let (x_sign, y_sign) = match direction {
            GuideDirection::Up => (0, 1),
            GuideDirection::Down => (0, -1),
            GuideDirection::Right => (1, 0),
            GuideDirection::Left => (-1, 0),
            GuideDirection::None => return Ok(0.0),
        };

        let requested = (amount.max(0.0) + 0.5) as i32;
        let mut steps = requested;

        if steps > 0 && self.would_hit_limit(direction, steps) {
            steps = (self.max_position(direction) - 1 - self.current_position(direction)).max(0);
            let limit = ActuatorError::TravelLimitExceeded {
                requested,
                applied: steps,
            };
            log::debug!("{}: {limit}, move truncated", self.core.name());
        }

        if steps > 0 {
            self.device.step(direction, steps as u32)?;
            self.x_offset += x_sign * steps;
            self.y_offset += y_sign * steps;
            log::debug!(
                "stepped: x_offset={} y_offset={}",
                self.x_offset,
                self.y_offset
            );
        }

        Ok(f64::from(steps))
    }

    fn clear_calibration(&mut self) {
        self.core.clear_calibration();
        self.calibrator.reset();
    }

    /// Reset bump state and return to center
    fn guiding_ceases(&mut self) -> ActuatorResult<()> {
        self.bump.reset();
        self.move_to_center()
    }

    fn settings_summary(&self) -> String {
        format!(
            "{}Calibration steps = {}, Samples to average = {}, Bump percentage = {}, Bump step = {:.2}\n",
            self.core.summary_header(),
            self.config.calibration_steps_per_iteration,
            self.config.samples_to_average,
            self.config.bump_percentage,
            self.config.bump_max_steps_per_cycle
        )
    }
}
