use guide_math::TransformError;
use thiserror::Error;

/// Errors reported by a guide device (pulse guider or step device).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The device link is down.
    #[error("device not connected")]
    NotConnected,

    /// The device refused or failed to execute a command.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    /// The device accepted a command but did not carry all of it out.
    #[error("move incomplete: requested {requested:.1}, applied {applied:.1}")]
    Incomplete {
        /// Requested amount (milliseconds or steps).
        requested: f64,
        /// Amount actually applied.
        applied: f64,
    },
}

/// Errors produced by an actuator and its calibration state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    /// Operation requires a connected actuator.
    #[error("not connected")]
    NotConnected,

    /// Connect called on an actuator that is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// Calibration cannot start from an invalid star position.
    #[error("must have a valid start position")]
    InvalidStartPosition,

    /// The star did not move far enough during a calibration phase.
    #[error("{phase} calibration failed: star did not move enough after {steps} steps")]
    InsufficientMotion {
        /// Calibration phase that gave up.
        phase: &'static str,
        /// Number of steps issued in that phase.
        steps: usize,
    },

    /// A device command failed.
    #[error("device command failed: {0}")]
    DeviceCommandFailed(#[from] DeviceError),

    /// A step move was truncated at the travel limit.
    #[error("travel limit: requested {requested} steps, applied {applied}")]
    TravelLimitExceeded {
        /// Steps requested.
        requested: i32,
        /// Steps applied after truncation.
        applied: i32,
    },

    /// No usable camera/mount transform.
    #[error("transform unavailable: {0}")]
    TransformUnavailable(String),

    /// A calibration update arrived while no calibration is running.
    #[error("not calibrating")]
    NotCalibrating,

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<TransformError> for ActuatorError {
    fn from(err: TransformError) -> Self {
        ActuatorError::TransformUnavailable(err.to_string())
    }
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;
