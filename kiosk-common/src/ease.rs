//! Easing for playback-rate ramps
//!
//! A ramp maps normalized progress `t` in `[0, 1]` to a weight in `[0, 1]`. Rate ramps must
//! start and end with zero slope so the playback speed never jerks.

use std::f64::consts::PI;

/// Easing curve types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaseCurve {
    /// v(t) = 0.5 × (1 - cos(π × t)), zero slope at both ends
    SCurve,
}

impl EaseCurve {
    /// Eased weight at normalized progress (clamped to 0.0..=1.0)
    ///
    /// Non-finite progress is treated as the start of the ramp.
    pub fn apply(&self, progress: f64) -> f64 {
        let t = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        match self {
            EaseCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
        }
    }

    /// Interpolate between `from` and `to` along the curve
    pub fn interpolate(&self, from: f64, to: f64, progress: f64) -> f64 {
        from + (to - from) * self.apply(progress)
    }
}
