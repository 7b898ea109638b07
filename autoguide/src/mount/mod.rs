//! Pulse-guided mount (primary actuator)

pub mod calibration;

use guide_math::{AxisTransform, Point2D};
use std::time::Duration;

use crate::actuator::{Actuator, ActuatorCore, CalibrationProgress};
use crate::calibration::CalibrationData;
use crate::config::MountConfig;
use crate::device::PulseGuider;
use crate::direction::{ActuatorKind, Axis, DecGuideMode, GuideDirection};
use crate::error::{ActuatorError, ActuatorResult};

pub use calibration::{
    MountCalibrationParams, MountCalibrationState, MountCalibrator, DEC_BACKLASH_DISTANCE,
    MAX_CALIBRATION_DISTANCE, MAX_CALIBRATION_STEPS,
};

/// Telescope mount guided with timed pulses
pub struct Mount {
    core: ActuatorCore,
    config: MountConfig,
    device: Box<dyn PulseGuider + Send>,
    calibrator: MountCalibrator,
    frame_height: Option<u32>,
}

impl Mount {
    /// Create a disconnected mount; invalid settings fall back to defaults
    pub fn new(
        name: impl Into<String>,
        device: Box<dyn PulseGuider + Send>,
        config: MountConfig,
    ) -> Self {
        Self {
            core: ActuatorCore::new(name),
            config: config.sanitized(),
            device,
            calibrator: MountCalibrator::default(),
            frame_height: None,
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Replace the settings, rejecting invalid ones
    pub fn set_config(&mut self, config: MountConfig) -> ActuatorResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Camera frame height in pixels, used to size calibration travel
    pub fn set_frame_height(&mut self, frame_height: Option<u32>) {
        self.frame_height = frame_height;
    }

    pub fn calibration_state(&self) -> MountCalibrationState {
        self.calibrator.state()
    }

    /// Adjust calibration for a meridian flip
    pub fn flip_calibration(&mut self) -> ActuatorResult<()> {
        let data = self.core.calibration().copied().ok_or_else(|| {
            ActuatorError::TransformUnavailable(format!("{} is not calibrated", self.core.name()))
        })?;
        let flipped = data.flipped(self.device.calibration_flip_requires_dec_flip());
        log::info!(
            "{}: flipping calibration x_angle {:.3} -> {:.3}, y_angle {:.3} -> {:.3}",
            self.core.name(),
            data.x_angle,
            flipped.x_angle,
            data.y_angle,
            flipped.y_angle
        );
        self.core.set_calibration(flipped);
        Ok(())
    }

    fn calibration_params(&self) -> MountCalibrationParams {
        MountCalibrationParams {
            pulse_ms: f64::from(self.config.calibration_duration_ms),
            distance_limit: MountCalibrationParams::distance_limit_for(self.frame_height),
            dec_guide_mode: self.config.dec_guide_mode,
        }
    }

    /// Apply the normal-move policy for one axis
    fn limit_duration(&self, direction: GuideDirection, duration: f64) -> f64 {
        let mut duration = duration;
        match direction.axis() {
            Some(Axis::Y) => {
                if self.config.dec_guide_mode.vetoes(direction) {
                    log::debug!(
                        "duration set to 0 by dec guide mode {}",
                        self.config.dec_guide_mode
                    );
                    duration = 0.0;
                }
                let max = f64::from(self.config.max_dec_duration_ms);
                if duration > max {
                    log::debug!("duration set to {max} by max dec duration");
                    duration = max;
                }
            }
            Some(Axis::X) => {
                let max = f64::from(self.config.max_ra_duration_ms);
                if duration > max {
                    log::debug!("duration set to {max} by max ra duration");
                    duration = max;
                }
            }
            None => duration = 0.0,
        }
        duration
    }
}

impl Actuator for Mount {
    fn kind(&self) -> ActuatorKind {
        ActuatorKind::Mount
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
        let params = self.calibration_params();
        let mut progress = match self.calibrator.update(current, &params) {
            Ok(progress) => progress,
            Err(ActuatorError::NotCalibrating) => return Err(ActuatorError::NotCalibrating),
            Err(e) => {
                log::warn!("{}: calibration failed: {e}", self.core.name());
                self.clear_calibration();
                return Err(e);
            }
        };

        if self.calibrator.state() == MountCalibrationState::Complete {
            let m = self.calibrator.measurement();
            let data = CalibrationData::new(
                m.x_angle,
                m.y_angle,
                m.x_rate,
                m.y_rate,
                self.device.declination().unwrap_or(0.0),
                self.device.side_of_pier(),
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
            direction.name(ActuatorKind::Mount),
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

        let duration = if normal_move {
            self.limit_duration(direction, amount.max(0.0))
        } else if direction == GuideDirection::None {
            0.0
        } else {
            amount.max(0.0)
        };

        if duration > 0.0 {
            let pulse = Duration::from_micros((duration * 1000.0).round() as u64);
            self.device.pulse_guide(direction, pulse)?;
        }

        Ok(duration)
    }

    /// Mode `None` does not need Dec; otherwise the Dec marker means uncalibrated
    fn is_calibrated(&self) -> bool {
        match self.core.calibration() {
            Some(data) => {
                self.config.dec_guide_mode == DecGuideMode::None
                    || data.has_dec_calibration()
            }
            None => false,
        }
    }

    fn clear_calibration(&mut self) {
        self.core.clear_calibration();
        self.calibrator.reset();
    }

    /// Dec-compensated transform
    fn transform(&self) -> ActuatorResult<AxisTransform> {
        if !self.is_calibrated() {
            return Err(ActuatorError::TransformUnavailable(format!(
                "{} is not calibrated",
                self.core.name()
            )));
        }
        let data = self.core.calibration().ok_or_else(|| {
            ActuatorError::TransformUnavailable(format!("{} has no calibration", self.core.name()))
        })?;
        let x_rate = match self.device.declination() {
            Some(dec) => data.compensated_x_rate(dec),
            None => data.x_rate,
        };
        Ok(data.transform_with_x_rate(x_rate)?)
    }

    fn settings_summary(&self) -> String {
        format!(
            "{}Calibration step = {} ms, Max RA duration = {}, Max DEC duration = {}, DEC guide mode = {}\n",
            self.core.summary_header(),
            self.config.calibration_duration_ms,
            self.config.max_ra_duration_ms,
            self.config.max_dec_duration_ms,
            self.config.dec_guide_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::PierSide;
    use crate::error::DeviceError;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingGuider {
        pulses: Arc<Mutex<Vec<(GuideDirection, Duration)>>>,
        fail: bool,
    }

    impl PulseGuider for RecordingGuider {
        fn pulse_guide(
            &mut self,
            direction: GuideDirection,
            duration: Duration,
        ) -> Result<(), DeviceError> {
            if self.fail {
                return Err(DeviceError::CommandRejected("pulse refused".to_string()));
            }
            self.pulses.lock().unwrap().push((direction, duration));
            Ok(())
        }
    }

    fn connected_mount(config: MountConfig) -> (Mount, RecordingGuider) {
        let guider = RecordingGuider::default();
        let mut mount = Mount::new("Test mount", Box::new(guider.clone()), config);
        mount.connect().unwrap();
        (mount, guider)
    }

    #[test]
    fn test_connect_twice() {
        let (mut mount, _) = connected_mount(MountConfig::default());
        assert_eq!(mount.connect(), Err(ActuatorError::AlreadyConnected));
        assert!(mount.is_connected());

        mount.disconnect().unwrap();
        assert_eq!(mount.disconnect(), Err(ActuatorError::NotConnected));
        assert!(!mount.is_connected());
    }

    #[test]
    fn test_begin_calibration_preconditions() {
        let mut mount = Mount::new(
            "Test mount",
            Box::new(RecordingGuider::default()),
            MountConfig::default(),
        );
        assert_eq!(
            mount.begin_calibration(Point2D::new(1.0, 1.0)),
            Err(ActuatorError::NotConnected)
        );

        mount.connect().unwrap();
        assert_eq!(
            mount.begin_calibration(Point2D::invalid()),
            Err(ActuatorError::InvalidStartPosition)
        );
        assert!(mount.begin_calibration(Point2D::new(1.0, 1.0)).is_ok());
        assert!(mount.is_calibrating());
    }

    #[test]
    fn test_dec_moves_clamped() {
        let (mut mount, guider) = connected_mount(MountConfig {
            max_dec_duration_ms: 300,
            ..Default::default()
        });

        let applied = mount.move_axis(GuideDirection::NORTH, 800.0, true).unwrap();
        assert_eq!(applied, 300.0);

        // Calibration moves bypass the clamp
        let applied = mount.move_axis(GuideDirection::NORTH, 800.0, false).unwrap();
        assert_eq!(applied, 800.0);

        let pulses = guider.pulses.lock().unwrap();
        assert_eq!(pulses[0], (GuideDirection::NORTH, Duration::from_millis(300)));
        assert_eq!(pulses[1], (GuideDirection::NORTH, Duration::from_millis(800)));
    }

    #[test]
    fn test_dec_mode_north_vetoes_south() {
        let (mut mount, guider) = connected_mount(MountConfig {
            dec_guide_mode: DecGuideMode::North,
            ..Default::default()
        });

        assert_eq!(mount.move_axis(GuideDirection::SOUTH, 200.0, true).unwrap(), 0.0);
        assert_eq!(mount.move_axis(GuideDirection::NORTH, 200.0, true).unwrap(), 200.0);
        assert_eq!(guider.pulses.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ra_clamp() {
        let (mut mount, _) = connected_mount(MountConfig {
            max_ra_duration_ms: 500,
            ..Default::default()
        });
        assert_eq!(mount.move_axis(GuideDirection::WEST, 900.0, true).unwrap(), 500.0);
        assert_eq!(mount.move_axis(GuideDirection::EAST, 120.0, true).unwrap(), 120.0);
    }

    #[test]
    fn test_guiding_disabled_sends_nothing() {
        let (mut mount, guider) = connected_mount(MountConfig::default());
        mount.set_guiding_enabled(false);

        assert_eq!(mount.move_axis(GuideDirection::WEST, 400.0, true).unwrap(), 0.0);
        assert!(guider.pulses.lock().unwrap().is_empty());
    }

    #[test]
    fn test_device_failure_reported() {
        let guider = RecordingGuider {
            fail: true,
            ..Default::default()
        };
        let mut mount = Mount::new("Test mount", Box::new(guider), MountConfig::default());
        mount.connect().unwrap();

        let result = mount.move_axis(GuideDirection::WEST, 100.0, true);
        assert!(matches!(result, Err(ActuatorError::DeviceCommandFailed(_))));
    }

    #[test]
    fn test_dec_marker_and_mode() {
        let (mut mount, _) = connected_mount(MountConfig::default());
        mount.set_calibration(CalibrationData::without_dec(0.0, 0.01, 0.0, PierSide::East));
        assert!(!mount.is_calibrated());

        mount
            .set_config(MountConfig {
                dec_guide_mode: DecGuideMode::None,
                ..Default::default()
            })
            .unwrap();
        assert!(mount.is_calibrated());

        mount.clear_calibration();
        assert!(!mount.is_calibrated());
    }

    #[test]
    fn test_settings_summary() {
        let (mount, _) = connected_mount(MountConfig::default());
        let summary = mount.settings_summary();

        assert!(summary.starts_with("Test mount, guiding enabled, not calibrated\n"));
        assert!(summary.contains(
            "Calibration step = 750 ms, Max RA duration = 1000, Max DEC duration = 1000, DEC guide mode = Auto"
        ));
    }

    #[test]
    fn test_flip_requires_calibration() {
        let (mut mount, _) = connected_mount(MountConfig::default());
        assert!(matches!(
            mount.flip_calibration(),
            Err(ActuatorError::TransformUnavailable(_))
        ));
    }
}
