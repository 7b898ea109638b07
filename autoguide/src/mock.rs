//! Simulated devices for tests and demos
//!
//! A [`SimulatedSky`] holds the true position of one guide star. The
//! simulated mount and step guider displace that star when they are
//! commanded, along configurable camera bearings and at configurable rates,
//! so calibration and guiding can be exercised end to end without hardware.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use guide_math::Point2D;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::device::{PulseGuider, StepDevice};
use crate::direction::{GuideDirection, PierSide};
use crate::error::DeviceError;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unit vector along a camera bearing
fn unit(bearing: f64) -> Point2D {
    Point2D::new(bearing.cos(), bearing.sin())
}

#[derive(Debug)]
struct SkyModel {
    position: Point2D,
    drift_per_frame: Point2D,
    jitter: f64,
    rng: ChaCha8Rng,
}

/// One guide star with optional drift and seeing jitter
///
/// Clones share the same star.
#[derive(Debug, Clone)]
pub struct SimulatedSky {
    model: Arc<Mutex<SkyModel>>,
}

impl SimulatedSky {
    pub fn new(start: Point2D) -> Self {
        Self {
            model: Arc::new(Mutex::new(SkyModel {
                position: start,
                drift_per_frame: Point2D::origin(),
                jitter: 0.0,
                rng: ChaCha8Rng::seed_from_u64(0),
            })),
        }
    }

    /// Move the star by `drift` before every observation
    pub fn with_drift(self, drift: Point2D) -> Self {
        self.set_drift(drift);
        self
    }

    pub fn set_drift(&self, drift: Point2D) {
        lock(&self.model).drift_per_frame = drift;
    }

    /// Add uniform noise of up to `amplitude` pixels per axis to observations
    pub fn with_jitter(self, amplitude: f64, seed: u64) -> Self {
        {
            let mut model = lock(&self.model);
            model.jitter = amplitude.abs();
            model.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self
    }

    /// True star position, without jitter
    pub fn position(&self) -> Point2D {
        lock(&self.model).position
    }

    pub fn displace(&self, by: Point2D) {
        let mut model = lock(&self.model);
        model.position += by;
    }

    /// Advance one frame and return the measured centroid
    pub fn observe(&self) -> Point2D {
        let mut model = lock(&self.model);
        let drift = model.drift_per_frame;
        model.position += drift;

        let mut observed = model.position;
        if model.jitter > 0.0 {
            let amplitude = model.jitter;
            observed.x += model.rng.gen_range(-amplitude..=amplitude);
            observed.y += model.rng.gen_range(-amplitude..=amplitude);
        }
        observed
    }
}

#[derive(Debug, Default)]
struct MountModel {
    pulses: Vec<(GuideDirection, Duration)>,
    declination: Option<f64>,
    pier_side: PierSide,
    dec_flip_required: bool,
    failing: bool,
    stuck: bool,
}

/// Pulse-guided mount that moves a [`SimulatedSky`]
///
/// West pulses move the star along `west_bearing`, North pulses along
/// `north_bearing`; rates are pixels per millisecond. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedMount {
    sky: SimulatedSky,
    west_bearing: f64,
    north_bearing: f64,
    ra_rate: f64,
    dec_rate: f64,
    model: Arc<Mutex<MountModel>>,
}

impl SimulatedMount {
    pub fn new(sky: SimulatedSky, west_bearing: f64, north_bearing: f64, rate: f64) -> Self {
        Self {
            sky,
            west_bearing,
            north_bearing,
            ra_rate: rate,
            dec_rate: rate,
            model: Arc::new(Mutex::new(MountModel::default())),
        }
    }

    pub fn with_rates(mut self, ra_rate: f64, dec_rate: f64) -> Self {
        self.ra_rate = ra_rate;
        self.dec_rate = dec_rate;
        self
    }

    pub fn with_declination(self, declination: f64) -> Self {
        lock(&self.model).declination = Some(declination);
        self
    }

    pub fn with_pier_side(self, pier_side: PierSide) -> Self {
        lock(&self.model).pier_side = pier_side;
        self
    }

    pub fn with_dec_flip_required(self, required: bool) -> Self {
        lock(&self.model).dec_flip_required = required;
        self
    }

    pub fn set_declination(&self, declination: Option<f64>) {
        lock(&self.model).declination = declination;
    }

    /// Reject every pulse from now on
    pub fn set_failing(&self, failing: bool) {
        lock(&self.model).failing = failing;
    }

    /// Accept pulses without moving the star
    pub fn set_stuck(&self, stuck: bool) {
        lock(&self.model).stuck = stuck;
    }

    /// Every accepted pulse so far
    pub fn pulses(&self) -> Vec<(GuideDirection, Duration)> {
        lock(&self.model).pulses.clone()
    }

    fn motion(&self, direction: GuideDirection) -> Option<(f64, f64)> {
        let (bearing, rate) = match direction {
            GuideDirection::Left => (self.west_bearing, self.ra_rate),
            GuideDirection::Right => (self.west_bearing + std::f64::consts::PI, self.ra_rate),
            GuideDirection::Up => (self.north_bearing, self.dec_rate),
            GuideDirection::Down => (self.north_bearing + std::f64::consts::PI, self.dec_rate),
            GuideDirection::None => return None,
        };
        Some((bearing, rate))
    }
}

impl PulseGuider for SimulatedMount {
    fn pulse_guide(
        &mut self,
        direction: GuideDirection,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        let mut model = lock(&self.model);
        if model.failing {
            return Err(DeviceError::CommandRejected(format!(
                "pulse {} refused",
                direction.code()
            )));
        }
        model.pulses.push((direction, duration));
        if model.stuck {
            return Ok(());
        }
        drop(model);

        if let Some((bearing, rate)) = self.motion(direction) {
            let ms = duration.as_secs_f64() * 1000.0;
            self.sky.displace(unit(bearing) * (rate * ms));
        }
        Ok(())
    }

    fn declination(&self) -> Option<f64> {
        lock(&self.model).declination
    }

    fn side_of_pier(&self) -> PierSide {
        lock(&self.model).pier_side
    }

    fn calibration_flip_requires_dec_flip(&self) -> bool {
        lock(&self.model).dec_flip_required
    }
}

#[derive(Debug, Default)]
struct StepModel {
    x: i32,
    y: i32,
    steps: Vec<(GuideDirection, u32)>,
    failing: bool,
}

/// Step guider that moves a [`SimulatedSky`]
///
/// Left steps move the star along `left_bearing`, Up steps along
/// `up_bearing`; `rate` is pixels per step. Steps that would leave the
/// travel range are rejected. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedStepGuider {
    sky: SimulatedSky,
    left_bearing: f64,
    up_bearing: f64,
    rate: f64,
    max_travel: i32,
    model: Arc<Mutex<StepModel>>,
}

impl SimulatedStepGuider {
    pub fn new(
        sky: SimulatedSky,
        left_bearing: f64,
        up_bearing: f64,
        rate: f64,
        max_travel: i32,
    ) -> Self {
        Self {
            sky,
            left_bearing,
            up_bearing,
            rate,
            max_travel,
            model: Arc::new(Mutex::new(StepModel::default())),
        }
    }

    /// Physical step position `(x, y)`, positive Right and Up
    pub fn position(&self) -> (i32, i32) {
        let model = lock(&self.model);
        (model.x, model.y)
    }

    pub fn steps(&self) -> Vec<(GuideDirection, u32)> {
        lock(&self.model).steps.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.model).failing = failing;
    }
}

impl StepDevice for SimulatedStepGuider {
    fn step(&mut self, direction: GuideDirection, steps: u32) -> Result<(), DeviceError> {
        let mut model = lock(&self.model);
        if model.failing {
            return Err(DeviceError::CommandRejected("step refused".to_string()));
        }

        let count = steps as i32;
        let (x, y, bearing) = match direction {
            GuideDirection::Up => (model.x, model.y + count, self.up_bearing),
            GuideDirection::Down => (
                model.x,
                model.y - count,
                self.up_bearing + std::f64::consts::PI,
            ),
            GuideDirection::Right => (
                model.x + count,
                model.y,
                self.left_bearing + std::f64::consts::PI,
            ),
            GuideDirection::Left => (model.x - count, model.y, self.left_bearing),
            GuideDirection::None => return Ok(()),
        };

        let range = -self.max_travel..self.max_travel;
        if !range.contains(&x) || !range.contains(&y) {
            return Err(DeviceError::CommandRejected(format!(
                "step {} x{} leaves travel range",
                direction.code(),
                steps
            )));
        }

        model.x = x;
        model.y = y;
        model.steps.push((direction, steps));
        drop(model);

        self.sky.displace(unit(bearing) * (self.rate * f64::from(steps)));
        Ok(())
    }

    fn max_position(&self, _direction: GuideDirection) -> i32 {
        self.max_travel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_jitter_is_seeded() {
        let a = SimulatedSky::new(Point2D::new(10.0, 10.0)).with_jitter(0.5, 7);
        let b = SimulatedSky::new(Point2D::new(10.0, 10.0)).with_jitter(0.5, 7);

        for _ in 0..10 {
            let pa = a.observe();
            let pb = b.observe();
            assert_eq!(pa, pb);
            assert!((pa.x - 10.0).abs() <= 0.5);
            assert!((pa.y - 10.0).abs() <= 0.5);
        }
        assert_eq!(a.position(), Point2D::new(10.0, 10.0));
    }

    #[test]
    fn test_drift_accumulates() {
        let sky = SimulatedSky::new(Point2D::origin()).with_drift(Point2D::new(0.1, -0.2));
        sky.observe();
        let seen = sky.observe();
        assert_relative_eq!(seen.x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(seen.y, -0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_mount_pulse_moves_star() {
        let sky = SimulatedSky::new(Point2D::origin());
        let mut mount = SimulatedMount::new(sky.clone(), 0.0, FRAC_PI_2, 0.01);

        mount
            .pulse_guide(GuideDirection::WEST, Duration::from_millis(500))
            .unwrap();
        mount
            .pulse_guide(GuideDirection::SOUTH, Duration::from_millis(200))
            .unwrap();

        let star = sky.position();
        assert_relative_eq!(star.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(star.y, -2.0, epsilon = 1e-9);
        assert_eq!(mount.pulses().len(), 2);
    }

    #[test]
    fn test_stuck_mount_records_but_does_not_move() {
        let sky = SimulatedSky::new(Point2D::origin());
        let mut mount = SimulatedMount::new(sky.clone(), 0.0, FRAC_PI_2, 0.01);
        mount.set_stuck(true);

        mount
            .pulse_guide(GuideDirection::WEST, Duration::from_millis(500))
            .unwrap();
        assert_eq!(sky.position(), Point2D::origin());
        assert_eq!(mount.pulses().len(), 1);
    }

    #[test]
    fn test_step_guider_rejects_out_of_range() {
        let sky = SimulatedSky::new(Point2D::origin());
        let mut ao = SimulatedStepGuider::new(sky.clone(), 0.0, FRAC_PI_2, 0.5, 10);

        ao.step(GuideDirection::Up, 9).unwrap();
        assert!(ao.step(GuideDirection::Up, 1).is_err());
        assert_eq!(ao.position(), (0, 9));
        assert_relative_eq!(sky.position().y, 4.5, epsilon = 1e-12);

        ao.step(GuideDirection::Left, 10).unwrap();
        assert!(ao.step(GuideDirection::Left, 1).is_err());
    }
}
