//! autoguide - Closed-loop correction core for telescope guiding
//!
//! Given a measured star position per frame, decides how far to move a
//! pulse-guided mount and an optional step guider (adaptive optics unit) to
//! hold the star on a lock position.
//!
//! - **Calibration** - per-actuator state machines that measure the camera
//!   bearing and rate of each axis
//! - **Dispatch** - camera error vectors resolved onto actuator axes,
//!   filtered and clamped into bounded commands
//! - **Bump** - mount moves that walk a step guider back to center
//! - **Session** - calibration sequencing, guide routing and move queues
//!
//! Devices are reached through the [`device::PulseGuider`] and
//! [`device::StepDevice`] traits; [`mock`] provides simulated ones.

pub mod actuator;
pub mod calibration;
pub mod callback;
pub mod config;
pub mod device;
pub mod direction;
pub mod error;
pub mod filter;
pub mod mock;
pub mod mount;
pub mod session;
pub mod step_guider;

// Re-export commonly used types for external use
pub use crate::actuator::{
    Actuator, ActuatorCore, AxisMove, CalibrationEvent, CalibrationMove, CalibrationProgress,
    GuideStep,
};
pub use crate::calibration::{CalibrationData, CalibrationFileError};
pub use crate::callback::{CallbackId, CallbackRegistry, GuideEvent};
pub use crate::config::{MountConfig, StepGuiderConfig};
pub use crate::device::{PulseGuider, StepDevice};
pub use crate::direction::{ActuatorKind, DecGuideMode, GuideDirection, PierSide};
pub use crate::error::{ActuatorError, ActuatorResult, DeviceError};
pub use crate::filter::{AxisFilter, IdentityFilter};
pub use crate::mount::Mount;
pub use crate::session::{GuideSession, ScheduledMove, SessionState};
pub use crate::step_guider::StepGuider;
pub use guide_math::Point2D;
