//! Shared actuator contract
//!
//! Both the mount and the step guider are driven through [`Actuator`]. The
//! trait carries the parts of guiding that do not depend on the device kind:
//! calibration bookkeeping, the guide-enable flag, per-axis filters, request
//! accounting and the camera-vector dispatcher [`Actuator::guide_vector`].

use guide_math::{AxisTransform, Point2D};

use crate::calibration::CalibrationData;
use crate::direction::{ActuatorKind, GuideDirection};
use crate::error::{ActuatorError, ActuatorResult, DeviceError};
use crate::filter::{AxisFilter, IdentityFilter};

/// One calibration-sized move requested by a calibration state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationMove {
    pub direction: GuideDirection,
    /// Milliseconds for a mount, steps for a step guider
    pub amount: f64,
}

impl CalibrationMove {
    pub fn new(direction: GuideDirection, amount: f64) -> Self {
        Self { direction, amount }
    }
}

/// Notable points in a calibration run
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    /// A calibration move was scheduled
    Step {
        phase: &'static str,
        direction: GuideDirection,
        step: usize,
        dx: f64,
        dy: f64,
        distance: f64,
    },
    /// One axis finished measuring
    DirectionComplete {
        phase: &'static str,
        angle: f64,
        rate: f64,
    },
}

/// Outcome of one calibration frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationProgress {
    /// Moves to schedule before the next frame
    pub moves: Vec<CalibrationMove>,
    pub events: Vec<CalibrationEvent>,
    /// Set on the frame that commits the calibration
    pub completed: Option<CalibrationData>,
}

impl CalibrationProgress {
    pub fn is_complete(&self) -> bool {
        self.completed.is_some()
    }
}

/// Result of dispatching one axis of a guide vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMove {
    pub direction: GuideDirection,
    /// Amount asked for after filtering (ms or steps)
    pub requested: f64,
    /// Amount the actuator actually applied
    pub applied: f64,
}

/// Result of [`Actuator::guide_vector`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideStep {
    /// Filtered correction in mount-frame pixels
    pub mount_offset: Point2D,
    pub x: AxisMove,
    pub y: AxisMove,
}

/// State every actuator carries regardless of kind
pub struct ActuatorCore {
    name: String,
    connected: bool,
    guiding_enabled: bool,
    calibration: Option<CalibrationData>,
    x_filter: Box<dyn AxisFilter + Send>,
    y_filter: Box<dyn AxisFilter + Send>,
    request_count: usize,
}

impl std::fmt::Debug for ActuatorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorCore")
            .field("name", &self.name)
            .field("connected", &self.connected)
            .field("guiding_enabled", &self.guiding_enabled)
            .field("calibration", &self.calibration)
            .field("request_count", &self.request_count)
            .finish_non_exhaustive()
    }
}

impl ActuatorCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            guiding_enabled: true,
            calibration: None,
            x_filter: Box::new(IdentityFilter),
            y_filter: Box::new(IdentityFilter),
            request_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn guiding_enabled(&self) -> bool {
        self.guiding_enabled
    }

    pub fn set_guiding_enabled(&mut self, enabled: bool) {
        self.guiding_enabled = enabled;
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref()
    }

    pub fn set_calibration(&mut self, data: CalibrationData) {
        self.calibration = Some(data);
    }

    pub fn clear_calibration(&mut self) {
        self.calibration = None;
    }

    pub fn set_filters(
        &mut self,
        x_filter: Box<dyn AxisFilter + Send>,
        y_filter: Box<dyn AxisFilter + Send>,
    ) {
        self.x_filter = x_filter;
        self.y_filter = y_filter;
    }

    /// Run each mount-frame component through its axis filter
    pub fn filter(&mut self, raw: Point2D) -> Point2D {
        Point2D::new(self.x_filter.result(raw.x), self.y_filter.result(raw.y))
    }

    pub fn reset_filters(&mut self) {
        self.x_filter.reset();
        self.y_filter.reset();
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn increment_request_count(&mut self) {
        self.request_count += 1;
    }

    pub fn decrement_request_count(&mut self) {
        self.request_count = self.request_count.saturating_sub(1);
    }

    /// First line of a settings summary
    pub fn summary_header(&self) -> String {
        let enabled = if self.guiding_enabled {
            "enabled"
        } else {
            "disabled"
        };
        let calibration = match &self.calibration {
            Some(data) => format!(
                "x_angle = {:.3}, x_rate = {:.4}, y_angle = {:.3}, y_rate = {:.4}",
                data.x_angle, data.x_rate, data.y_angle, data.y_rate
            ),
            None => "not calibrated".to_string(),
        };
        format!("{}, guiding {}, {}\n", self.name, enabled, calibration)
    }
}

/// A controllable guiding device
pub trait Actuator {
    fn kind(&self) -> ActuatorKind;
    fn core(&self) -> &ActuatorCore;
    fn core_mut(&mut self) -> &mut ActuatorCore;

    fn connect(&mut self) -> ActuatorResult<()>;
    fn disconnect(&mut self) -> ActuatorResult<()>;

    /// Start calibrating from `start`, discarding any committed calibration
    fn begin_calibration(&mut self, start: Point2D) -> ActuatorResult<()>;

    /// Advance calibration by one frame
    ///
    /// A failure clears calibration before it is returned.
    fn update_calibration_state(&mut self, current: &Point2D)
        -> ActuatorResult<CalibrationProgress>;

    fn is_calibrating(&self) -> bool;

    /// Move one axis; returns the amount actually applied
    fn move_axis(
        &mut self,
        direction: GuideDirection,
        amount: f64,
        normal_move: bool,
    ) -> ActuatorResult<f64>;

    /// Drop committed calibration and any calibration in progress
    fn clear_calibration(&mut self);

    fn settings_summary(&self) -> String;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    fn guiding_enabled(&self) -> bool {
        self.core().guiding_enabled()
    }

    fn set_guiding_enabled(&mut self, enabled: bool) {
        log::info!("{}: guiding enabled = {}", self.name(), enabled);
        self.core_mut().set_guiding_enabled(enabled);
    }

    fn calibration(&self) -> Option<&CalibrationData> {
        self.core().calibration()
    }

    fn is_calibrated(&self) -> bool {
        self.core().calibration().is_some()
    }

    fn set_calibration(&mut self, data: CalibrationData) {
        log::info!(
            "{}: calibration set x_angle={:.3} y_angle={:.3} x_rate={:.4} y_rate={:.4}",
            self.name(),
            data.x_angle,
            data.y_angle,
            data.x_rate,
            data.y_rate
        );
        self.core_mut().set_calibration(data);
    }

    /// Camera/actuator transform for the current calibration
    fn transform(&self) -> ActuatorResult<AxisTransform> {
        if !self.is_calibrated() {
            return Err(ActuatorError::TransformUnavailable(format!(
                "{} is not calibrated",
                self.name()
            )));
        }
        let data = self.calibration().ok_or_else(|| {
            ActuatorError::TransformUnavailable(format!("{} has no calibration", self.name()))
        })?;
        Ok(data.transform()?)
    }

    /// Issue one calibration move; it must be applied in full
    fn calibration_move(&mut self, calibration_move: CalibrationMove) -> ActuatorResult<()> {
        let CalibrationMove { direction, amount } = calibration_move;
        log::debug!(
            "{} calibration move {} {:.1}",
            self.name(),
            direction.name(self.kind()),
            amount
        );

        let applied = self.move_axis(direction, amount, false)?;
        if (applied - amount).abs() > 1e-6 {
            return Err(DeviceError::Incomplete {
                requested: amount,
                applied,
            }
            .into());
        }
        Ok(())
    }

    /// Move so the star travels by `camera_vector` (camera pixels)
    ///
    /// The vector is resolved onto the actuator axes, filtered for normal
    /// moves, and sent as one move per axis. Positive mount X moves
    /// West/Left, positive mount Y moves South/Down.
    fn guide_vector(
        &mut self,
        camera_vector: &Point2D,
        normal_move: bool,
    ) -> ActuatorResult<GuideStep> {
        let transform = self.transform()?;
        let raw = transform.camera_to_mount(camera_vector)?;
        let mount_offset = if normal_move {
            self.core_mut().filter(raw)
        } else {
            raw
        };

        let x_direction = if mount_offset.x > 0.0 {
            GuideDirection::WEST
        } else {
            GuideDirection::EAST
        };
        let y_direction = if mount_offset.y > 0.0 {
            GuideDirection::SOUTH
        } else {
            GuideDirection::NORTH
        };
        let x_requested = mount_offset.x.abs() / transform.x_rate();
        let y_requested = mount_offset.y.abs() / transform.y_rate();

        let x_applied = self.move_axis(x_direction, x_requested, normal_move)?;
        let y_applied = self.move_axis(y_direction, y_requested, normal_move)?;

        log::debug!(
            "{} guide {}{:.1} {}{:.1} (mount offset {:.2}, {:.2})",
            self.name(),
            x_direction.code(),
            x_applied,
            y_direction.code(),
            y_applied,
            mount_offset.x,
            mount_offset.y
        );

        Ok(GuideStep {
            mount_offset,
            x: AxisMove {
                direction: x_direction,
                requested: x_requested,
                applied: x_applied,
            },
            y: AxisMove {
                direction: y_direction,
                requested: y_requested,
                applied: y_applied,
            },
        })
    }

    /// Guiding stopped
    fn guiding_ceases(&mut self) -> ActuatorResult<()> {
        Ok(())
    }

    /// A scheduled move has not been executed yet
    fn is_busy(&self) -> bool {
        self.core().request_count() > 0
    }
}
