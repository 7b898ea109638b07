//! Common utilities for autoguide tests

#![allow(dead_code)]

use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex};

use autoguide::mock::{SimulatedMount, SimulatedSky, SimulatedStepGuider};
use autoguide::{
    Actuator, ActuatorResult, GuideEvent, GuideSession, Mount, MountConfig, Point2D,
    SessionState, StepGuider, StepGuiderConfig,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Geometry of a simulated mount
#[derive(Debug, Clone, Copy)]
pub struct MountParams {
    pub west_bearing: f64,
    pub north_bearing: f64,
    /// Pixels per millisecond
    pub rate: f64,
}

impl Default for MountParams {
    fn default() -> Self {
        Self {
            west_bearing: 0.3,
            north_bearing: 0.3 + FRAC_PI_2,
            rate: 0.02,
        }
    }
}

/// Geometry of a simulated step guider
#[derive(Debug, Clone, Copy)]
pub struct StepGuiderParams {
    pub left_bearing: f64,
    pub up_bearing: f64,
    /// Pixels per step
    pub rate: f64,
    pub max_travel: i32,
}

impl Default for StepGuiderParams {
    fn default() -> Self {
        Self {
            left_bearing: -0.2,
            up_bearing: -0.2 + FRAC_PI_2,
            rate: 0.5,
            max_travel: 45,
        }
    }
}

/// A session wired to simulated hardware
pub struct Rig {
    pub sky: SimulatedSky,
    pub mount: Option<SimulatedMount>,
    pub step_guider: Option<SimulatedStepGuider>,
    pub session: GuideSession,
    pub events: Arc<Mutex<Vec<GuideEvent>>>,
}

impl Rig {
    pub fn build(
        sky: SimulatedSky,
        mount: Option<(MountParams, MountConfig)>,
        step_guider: Option<(StepGuiderParams, StepGuiderConfig)>,
    ) -> Self {
        let mount_device = mount.as_ref().map(|(params, _)| {
            SimulatedMount::new(
                sky.clone(),
                params.west_bearing,
                params.north_bearing,
                params.rate,
            )
        });
        let step_device = step_guider.as_ref().map(|(params, _)| {
            SimulatedStepGuider::new(
                sky.clone(),
                params.left_bearing,
                params.up_bearing,
                params.rate,
                params.max_travel,
            )
        });
        Self::with_devices(
            sky,
            mount_device,
            mount.map(|(_, config)| config),
            step_device,
            step_guider.map(|(_, config)| config),
        )
    }

    pub fn with_devices(
        sky: SimulatedSky,
        mount_device: Option<SimulatedMount>,
        mount_config: Option<MountConfig>,
        step_device: Option<SimulatedStepGuider>,
        step_config: Option<StepGuiderConfig>,
    ) -> Self {
        let mount = mount_device.as_ref().map(|device| {
            let mut mount = Mount::new(
                "Simulated mount",
                Box::new(device.clone()),
                mount_config.clone().unwrap_or_default(),
            );
            mount.connect().unwrap();
            mount
        });
        let step_guider = step_device.as_ref().map(|device| {
            let mut ao = StepGuider::new(
                "Simulated AO",
                Box::new(device.clone()),
                step_config.clone().unwrap_or_default(),
            );
            ao.connect().unwrap();
            ao
        });

        let session = GuideSession::new(mount, step_guider);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        session.register_callback(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            sky,
            mount: mount_device,
            step_guider: step_device,
            session,
            events,
        }
    }

    /// Mount only, default geometry and settings
    pub fn mount_only() -> Self {
        Self::build(
            SimulatedSky::new(Point2D::new(200.0, 200.0)),
            Some((MountParams::default(), MountConfig::default())),
            None,
        )
    }

    /// Step guider only, default geometry and settings
    pub fn step_guider_only() -> Self {
        Self::build(
            SimulatedSky::new(Point2D::new(200.0, 200.0)),
            None,
            Some((StepGuiderParams::default(), StepGuiderConfig::default())),
        )
    }

    /// One frame: observe, decide, execute
    pub fn frame(&mut self) -> ActuatorResult<Point2D> {
        let star = self.sky.observe();
        self.session.process_frame(&star)?;
        self.session.execute_scheduled()?;
        Ok(star)
    }

    /// Calibrate everything that needs it; returns the number of frames used
    pub fn calibrate(&mut self, max_frames: usize) -> ActuatorResult<usize> {
        let start = self.sky.observe();
        self.session.start_calibration(start)?;

        let mut frames = 0;
        while matches!(self.session.state(), SessionState::Calibrating(_)) {
            assert!(frames < max_frames, "calibration did not finish in {max_frames} frames");
            self.frame()?;
            frames += 1;
        }
        Ok(frames)
    }

    pub fn events(&self) -> Vec<GuideEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_events(&self, predicate: impl Fn(&GuideEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

/// Angle difference folded into [0, PI]
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(std::f64::consts::TAU);
    d.min(std::f64::consts::TAU - d)
}
