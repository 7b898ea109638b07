//! Guide session
//!
//! Owns up to one mount and one step guider and drives them frame by frame.
//! [`GuideSession::process_frame`] only decides: calibration steps and guide
//! vectors are pushed onto a per-actuator queue. [`GuideSession::execute_scheduled`]
//! then runs the queues, step guider first, so a bump produced by a step
//! guider move lands on the mount queue and goes out in the same pass.

use std::collections::VecDeque;

use guide_math::Point2D;

use crate::actuator::{Actuator, CalibrationEvent, CalibrationMove};
use crate::callback::{CallbackId, CallbackRegistry, GuideEvent};
use crate::direction::ActuatorKind;
use crate::error::{ActuatorError, ActuatorResult};
use crate::mount::Mount;
use crate::step_guider::{BumpAction, PrimaryStatus, StepGuider};

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing scheduled per frame
    Idle,
    /// Calibrating the given actuator
    Calibrating(ActuatorKind),
    /// Correcting toward the lock position
    Guiding,
}

/// A move waiting for the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledMove {
    Calibration(CalibrationMove),
    /// Camera vector for [`Actuator::guide_vector`]
    Vector { camera: Point2D, normal_move: bool },
}

pub struct GuideSession {
    mount: Option<Mount>,
    step_guider: Option<StepGuider>,
    state: SessionState,
    lock_position: Point2D,
    mount_queue: VecDeque<ScheduledMove>,
    step_guider_queue: VecDeque<ScheduledMove>,
    callbacks: CallbackRegistry,
}

impl GuideSession {
    pub fn new(mount: Option<Mount>, step_guider: Option<StepGuider>) -> Self {
        Self {
            mount,
            step_guider,
            state: SessionState::Idle,
            lock_position: Point2D::invalid(),
            mount_queue: VecDeque::new(),
            step_guider_queue: VecDeque::new(),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mount(&self) -> Option<&Mount> {
        self.mount.as_ref()
    }

    pub fn mount_mut(&mut self) -> Option<&mut Mount> {
        self.mount.as_mut()
    }

    pub fn step_guider(&self) -> Option<&StepGuider> {
        self.step_guider.as_ref()
    }

    pub fn step_guider_mut(&mut self) -> Option<&mut StepGuider> {
        self.step_guider.as_mut()
    }

    pub fn lock_position(&self) -> Option<Point2D> {
        self.lock_position.is_valid().then_some(self.lock_position)
    }

    /// Move the lock position while guiding
    pub fn set_lock_position(&mut self, lock: Point2D) -> ActuatorResult<()> {
        if !lock.is_valid() {
            return Err(ActuatorError::InvalidStartPosition);
        }
        log::info!("lock position set to ({:.2}, {:.2})", lock.x, lock.y);
        self.lock_position = lock;
        Ok(())
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Register a callback for guide events
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&GuideEvent) + Send + Sync + 'static,
    {
        self.callbacks.register_callback(callback)
    }

    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        self.callbacks.deregister_callback(callback_id)
    }

    /// Moves queued for `kind` and not yet executed
    pub fn pending_moves(&self, kind: ActuatorKind) -> usize {
        match kind {
            ActuatorKind::Mount => self.mount_queue.len(),
            ActuatorKind::StepGuider => self.step_guider_queue.len(),
        }
    }

    /// Settings of every actuator, one block each
    pub fn settings_summary(&self) -> String {
        let mut summary = String::new();
        if let Some(mount) = &self.mount {
            summary.push_str(&mount.settings_summary());
        }
        if let Some(step_guider) = &self.step_guider {
            summary.push_str(&step_guider.settings_summary());
        }
        summary
    }

    fn actuator(&self, kind: ActuatorKind) -> Option<&dyn Actuator> {
        match kind {
            ActuatorKind::Mount => self.mount.as_ref().map(|m| m as &dyn Actuator),
            ActuatorKind::StepGuider => self.step_guider.as_ref().map(|s| s as &dyn Actuator),
        }
    }

    fn actuator_mut(&mut self, kind: ActuatorKind) -> ActuatorResult<&mut dyn Actuator> {
        let actuator = match kind {
            ActuatorKind::Mount => self.mount.as_mut().map(|m| m as &mut dyn Actuator),
            ActuatorKind::StepGuider => {
                self.step_guider.as_mut().map(|s| s as &mut dyn Actuator)
            }
        };
        actuator.ok_or(ActuatorError::NotConnected)
    }

    fn queue_mut(&mut self, kind: ActuatorKind) -> &mut VecDeque<ScheduledMove> {
        match kind {
            ActuatorKind::Mount => &mut self.mount_queue,
            ActuatorKind::StepGuider => &mut self.step_guider_queue,
        }
    }

    /// Queue a move; the actuator counts as busy until it runs
    pub fn enqueue(&mut self, kind: ActuatorKind, scheduled: ScheduledMove) -> ActuatorResult<()> {
        self.actuator_mut(kind)?
            .core_mut()
            .increment_request_count();
        self.queue_mut(kind).push_back(scheduled);
        Ok(())
    }

    fn clear_queue(&mut self, kind: ActuatorKind) {
        let dropped = self.queue_mut(kind).len();
        self.queue_mut(kind).clear();
        if let Ok(actuator) = self.actuator_mut(kind) {
            for _ in 0..dropped {
                actuator.core_mut().decrement_request_count();
            }
        }
        if dropped > 0 {
            log::debug!("dropped {dropped} queued {kind} moves");
        }
    }

    /// First present actuator that still needs calibrating
    fn next_uncalibrated(&self) -> Option<ActuatorKind> {
        [ActuatorKind::Mount, ActuatorKind::StepGuider]
            .into_iter()
            .find(|&kind| self.actuator(kind).is_some_and(|a| !a.is_calibrated()))
    }

    /// Calibrate every present actuator that is not yet calibrated, mount first
    pub fn start_calibration(&mut self, current: Point2D) -> ActuatorResult<()> {
        if !current.is_valid() {
            return Err(ActuatorError::InvalidStartPosition);
        }
        if self.mount.is_none() && self.step_guider.is_none() {
            return Err(ActuatorError::NotConnected);
        }
        match self.state {
            SessionState::Guiding => self.stop_guiding()?,
            SessionState::Calibrating(_) => self.abort_calibration()?,
            SessionState::Idle => {}
        }

        match self.next_uncalibrated() {
            Some(kind) => self.begin_calibration(kind, current),
            None => {
                log::info!("all actuators already calibrated");
                Ok(())
            }
        }
    }

    /// Discard all calibration and calibrate from scratch
    pub fn recalibrate(&mut self, current: Point2D) -> ActuatorResult<()> {
        if let Some(mount) = &mut self.mount {
            mount.clear_calibration();
        }
        if let Some(step_guider) = &mut self.step_guider {
            step_guider.clear_calibration();
        }
        self.start_calibration(current)
    }

    fn begin_calibration(&mut self, kind: ActuatorKind, start: Point2D) -> ActuatorResult<()> {
        self.actuator_mut(kind)?.begin_calibration(start)?;
        self.state = SessionState::Calibrating(kind);
        log::info!("calibrating {kind}");
        self.callbacks
            .emit(&GuideEvent::CalibrationStarted { actuator: kind, start });
        Ok(())
    }

    /// Stop a calibration in progress, leaving the actuator uncalibrated
    pub fn abort_calibration(&mut self) -> ActuatorResult<()> {
        let SessionState::Calibrating(kind) = self.state else {
            return Err(ActuatorError::NotCalibrating);
        };
        self.clear_queue(kind);
        self.actuator_mut(kind)?.clear_calibration();
        self.state = SessionState::Idle;
        log::warn!("{kind} calibration aborted");
        Ok(())
    }

    fn fail_calibration(&mut self, kind: ActuatorKind, error: &ActuatorError) {
        self.clear_queue(kind);
        if let Ok(actuator) = self.actuator_mut(kind) {
            actuator.clear_calibration();
        }
        self.state = SessionState::Idle;
        log::warn!("{kind} calibration failed: {error}");
        self.callbacks.emit(&GuideEvent::CalibrationFailed {
            actuator: kind,
            message: error.to_string(),
        });
    }

    /// Start guiding toward `lock`; every present actuator must be calibrated
    pub fn start_guiding(&mut self, lock: Point2D) -> ActuatorResult<()> {
        if !lock.is_valid() {
            return Err(ActuatorError::InvalidStartPosition);
        }
        if self.mount.is_none() && self.step_guider.is_none() {
            return Err(ActuatorError::NotConnected);
        }

        for kind in [ActuatorKind::Mount, ActuatorKind::StepGuider] {
            let Some(actuator) = self.actuator(kind) else {
                continue;
            };
            if !actuator.is_connected() {
                return Err(ActuatorError::NotConnected);
            }
            if !actuator.is_calibrated() {
                return Err(ActuatorError::TransformUnavailable(format!(
                    "{} is not calibrated",
                    actuator.name()
                )));
            }
        }

        for kind in [ActuatorKind::Mount, ActuatorKind::StepGuider] {
            if let Ok(actuator) = self.actuator_mut(kind) {
                actuator.core_mut().reset_filters();
            }
        }

        self.lock_position = lock;
        self.state = SessionState::Guiding;
        log::info!("guiding started, lock at ({:.2}, {:.2})", lock.x, lock.y);
        Ok(())
    }

    /// Stop guiding; the step guider returns to center
    pub fn stop_guiding(&mut self) -> ActuatorResult<()> {
        if self.state != SessionState::Guiding {
            return Ok(());
        }
        self.state = SessionState::Idle;

        for kind in [ActuatorKind::StepGuider, ActuatorKind::Mount] {
            self.clear_queue(kind);
        }
        // Every actuator is told, even if an earlier one fails
        let mut first_error = None;
        for kind in [ActuatorKind::StepGuider, ActuatorKind::Mount] {
            if let Ok(actuator) = self.actuator_mut(kind) {
                actuator.core_mut().reset_filters();
                if let Err(error) = actuator.guiding_ceases() {
                    log::warn!("{kind} failed to stop cleanly: {error}");
                    first_error.get_or_insert(error);
                }
            }
        }

        log::info!("guiding stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Decide what to do with one measured star position
    pub fn process_frame(&mut self, current: &Point2D) -> ActuatorResult<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Calibrating(kind) => self.calibration_frame(kind, current),
            SessionState::Guiding => self.guide_frame(current),
        }
    }

    fn calibration_frame(&mut self, kind: ActuatorKind, current: &Point2D) -> ActuatorResult<()> {
        if !current.is_valid() {
            log::warn!("skipping calibration frame without a star");
            return Ok(());
        }

        let result = self.actuator_mut(kind)?.update_calibration_state(current);
        let progress = match result {
            Ok(progress) => progress,
            Err(e) => {
                self.fail_calibration(kind, &e);
                return Err(e);
            }
        };

        for event in &progress.events {
            self.callbacks.emit(&calibration_event(kind, event));
        }
        for calibration_move in progress.moves {
            self.enqueue(kind, ScheduledMove::Calibration(calibration_move))?;
        }

        if let Some(calibration) = progress.completed {
            self.callbacks.emit(&GuideEvent::CalibrationComplete {
                actuator: kind,
                calibration,
            });
            self.state = SessionState::Idle;
            if let Some(next) = self.next_uncalibrated() {
                self.begin_calibration(next, *current)?;
            } else {
                log::info!("calibration finished");
            }
        }
        Ok(())
    }

    fn guide_frame(&mut self, current: &Point2D) -> ActuatorResult<()> {
        if !current.is_valid() {
            log::warn!("skipping guide frame without a star");
            return Ok(());
        }

        let error = self.lock_position - *current;
        let kind = if self.step_guider.is_some() {
            ActuatorKind::StepGuider
        } else {
            ActuatorKind::Mount
        };
        log::debug!("guide error ({:.3}, {:.3}) -> {kind}", error.x, error.y);
        self.enqueue(
            kind,
            ScheduledMove::Vector {
                camera: error,
                normal_move: true,
            },
        )
    }

    /// Run every queued move; returns how many were executed
    pub fn execute_scheduled(&mut self) -> ActuatorResult<usize> {
        let mut executed = 0;
        while let Some(scheduled) = self.step_guider_queue.pop_front() {
            self.execute(ActuatorKind::StepGuider, scheduled)?;
            executed += 1;
        }
        while let Some(scheduled) = self.mount_queue.pop_front() {
            self.execute(ActuatorKind::Mount, scheduled)?;
            executed += 1;
        }
        Ok(executed)
    }

    fn execute(&mut self, kind: ActuatorKind, scheduled: ScheduledMove) -> ActuatorResult<()> {
        let actuator = self.actuator_mut(kind)?;
        actuator.core_mut().decrement_request_count();

        match scheduled {
            ScheduledMove::Calibration(calibration_move) => {
                let result = actuator.calibration_move(calibration_move);
                if let Err(e) = result {
                    if self.state == SessionState::Calibrating(kind) {
                        self.fail_calibration(kind, &e);
                    }
                    return Err(e);
                }
            }
            ScheduledMove::Vector {
                camera,
                normal_move,
            } => {
                let step = actuator.guide_vector(&camera, normal_move)?;
                self.callbacks
                    .emit(&GuideEvent::GuideStep { actuator: kind, step });
                if kind == ActuatorKind::StepGuider {
                    self.bump_after_move(normal_move)?;
                }
            }
        }
        Ok(())
    }

    fn primary_status(&self) -> PrimaryStatus {
        match &self.mount {
            None => PrimaryStatus::Absent,
            Some(mount) if mount.is_busy() => PrimaryStatus::Busy,
            Some(_) => PrimaryStatus::Idle,
        }
    }

    fn bump_after_move(&mut self, normal_move: bool) -> ActuatorResult<()> {
        let primary = self.primary_status();
        let Some(step_guider) = self.step_guider.as_mut() else {
            return Ok(());
        };

        let action = step_guider.update_bump(normal_move, primary)?;
        match action {
            BumpAction::None => {}
            BumpAction::Schedule(bump) => {
                let remaining = step_guider
                    .bump_controller()
                    .remaining()
                    .unwrap_or_else(Point2D::origin);
                self.callbacks
                    .emit(&GuideEvent::BumpScheduled { bump, remaining });
                self.enqueue(
                    ActuatorKind::Mount,
                    ScheduledMove::Vector {
                        camera: bump,
                        normal_move: false,
                    },
                )?;
            }
            BumpAction::Finished => self.callbacks.emit(&GuideEvent::BumpFinished),
        }
        Ok(())
    }
}

fn calibration_event(kind: ActuatorKind, event: &CalibrationEvent) -> GuideEvent {
    match *event {
        CalibrationEvent::Step {
            phase,
            direction,
            step,
            dx,
            dy,
            distance,
        } => GuideEvent::CalibrationStep {
            actuator: kind,
            phase,
            direction,
            step,
            dx,
            dy,
            distance,
        },
        CalibrationEvent::DirectionComplete { phase, angle, rate } => {
            GuideEvent::CalibrationDirectionComplete {
                actuator: kind,
                phase,
                angle,
                rate,
            }
        }
    }
}
