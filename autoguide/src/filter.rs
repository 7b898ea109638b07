//! Per-axis correction filters
//!
//! Guide algorithms (hysteresis, low-pass, resist-switch...) are supplied by
//! the caller. The core only needs a raw-distance-in, filtered-distance-out
//! capability per axis.

/// Maps a raw per-axis distance (mount-frame pixels) to the correction to apply
pub trait AxisFilter {
    /// Filtered correction for this frame's raw distance
    fn result(&mut self, raw: f64) -> f64;

    /// Drop accumulated history (guiding stopped or restarted)
    fn reset(&mut self) {}
}

/// Passes the raw distance through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl AxisFilter for IdentityFilter {
    fn result(&mut self, raw: f64) -> f64 {
        raw
    }
}
