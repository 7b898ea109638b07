//! Device capabilities consumed by the actuators
//!
//! Hardware drivers live outside this crate; they only need to implement the
//! trait matching the kind of actuator they back.

use std::time::Duration;

use crate::direction::{GuideDirection, PierSide};
use crate::error::DeviceError;

/// Mount that accepts timed guide pulses
pub trait PulseGuider {
    /// Open the device link
    fn connect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Close the device link
    fn disconnect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Issue one guide pulse, blocking until it completes
    fn pulse_guide(&mut self, direction: GuideDirection, duration: Duration)
        -> Result<(), DeviceError>;

    /// Current pointing declination in radians, if the mount reports it
    fn declination(&self) -> Option<f64> {
        None
    }

    fn side_of_pier(&self) -> PierSide {
        PierSide::Unknown
    }

    /// Whether the mount itself reverses Dec after a meridian flip
    fn calibration_flip_requires_dec_flip(&self) -> bool {
        false
    }
}

/// Limited-range step guider (adaptive optics unit)
pub trait StepDevice {
    /// Open the device link
    fn connect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Close the device link
    fn disconnect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Move `steps` steps in `direction`, blocking until done
    fn step(&mut self, direction: GuideDirection, steps: u32) -> Result<(), DeviceError>;

    /// Steps of travel available from center in `direction`
    fn max_position(&self, direction: GuideDirection) -> i32;
}
