use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use guide_math::Point2D;

use crate::actuator::GuideStep;
use crate::calibration::CalibrationData;
use crate::direction::{ActuatorKind, GuideDirection};

/// Events emitted for external callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum GuideEvent {
    /// An actuator began calibrating
    CalibrationStarted {
        actuator: ActuatorKind,
        start: Point2D,
    },
    /// A calibration move was scheduled
    CalibrationStep {
        actuator: ActuatorKind,
        phase: &'static str,
        direction: GuideDirection,
        step: usize,
        dx: f64,
        dy: f64,
        distance: f64,
    },
    /// One axis of a calibration finished measuring
    CalibrationDirectionComplete {
        actuator: ActuatorKind,
        phase: &'static str,
        angle: f64,
        rate: f64,
    },
    /// Calibration committed
    CalibrationComplete {
        actuator: ActuatorKind,
        calibration: CalibrationData,
    },
    /// Calibration aborted with an error; the actuator is uncalibrated
    CalibrationFailed {
        actuator: ActuatorKind,
        message: String,
    },
    /// A guide vector was applied
    GuideStep {
        actuator: ActuatorKind,
        step: GuideStep,
    },
    /// A mount bump was queued
    BumpScheduled { bump: Point2D, remaining: Point2D },
    /// The pending bump has been fully issued
    BumpFinished,
}

/// Callback ID for registration/deregistration
pub type CallbackId = u64;

/// Callback function type
pub type GuideCallback = Arc<dyn Fn(&GuideEvent) + Send + Sync>;

/// Registered event listeners
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: Arc<Mutex<HashMap<CallbackId, GuideCallback>>>,
    next_callback_id: Arc<Mutex<CallbackId>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for guide events
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&GuideEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next_id = self
            .next_callback_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let callback_id = *next_id;
        *next_id += 1;

        callbacks.insert(callback_id, Arc::new(callback));
        callback_id
    }

    /// Deregister a callback
    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        callbacks.remove(&callback_id).is_some()
    }

    /// Get the number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Emit an event to all registered callbacks
    pub fn emit(&self, event: &GuideEvent) {
        // Snapshot so a callback may register or deregister without deadlocking
        let callbacks: Vec<GuideCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_registration() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        let callback_id = registry.register_callback(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.callback_count(), 1);

        registry.emit(&GuideEvent::BumpFinished);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(registry.deregister_callback(callback_id));
        assert!(!registry.deregister_callback(callback_id));

        registry.emit(&GuideEvent::BumpFinished);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.callback_count(), 0);
    }

    #[test]
    fn test_multiple_callbacks() {
        let registry = CallbackRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let first = events.clone();
        let id1 = registry.register_callback(move |event| {
            first.lock().unwrap().push(("first", event.clone()));
        });
        let second = events.clone();
        let id2 = registry.register_callback(move |event| {
            second.lock().unwrap().push(("second", event.clone()));
        });
        assert_ne!(id1, id2);

        registry.emit(&GuideEvent::CalibrationFailed {
            actuator: ActuatorKind::Mount,
            message: "stuck".to_string(),
        });

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|(_, e)| matches!(e, GuideEvent::CalibrationFailed { .. })));
    }

    #[test]
    fn test_clones_share_listeners() {
        let registry = CallbackRegistry::new();
        let clone = registry.clone();
        clone.register_callback(|_| {});
        assert_eq!(registry.callback_count(), 1);
    }
}
