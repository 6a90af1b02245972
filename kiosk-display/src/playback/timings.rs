//! Loop choreography timings (`[playback]` config section)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::rate::PRIMER_RATE;

/// Timings for one playback cycle, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTimings {
    /// Top rate multiplier reached after the ease-in
    pub pace: f64,
    pub primer_ms: u64,
    pub ease_in_ms: u64,
    pub ease_out_ms: u64,
    /// Dwell on the paused final frame
    pub final_frame_dwell_ms: u64,
    pub crossfade_ms: u64,
    /// Still held fully opaque before the loop restarts
    pub loop_restart_delay_ms: u64,
    pub still_fade_out_ms: u64,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            pace: 0.7,
            primer_ms: 1500,
            ease_in_ms: 2500,
            ease_out_ms: 2500,
            final_frame_dwell_ms: 4000,
            crossfade_ms: 8000,
            loop_restart_delay_ms: 2000,
            still_fade_out_ms: 1000,
        }
    }
}

impl PlaybackTimings {
    pub fn primer(&self) -> Duration {
        Duration::from_millis(self.primer_ms)
    }

    pub fn ease_in(&self) -> Duration {
        Duration::from_millis(self.ease_in_ms)
    }

    pub fn ease_out(&self) -> Duration {
        Duration::from_millis(self.ease_out_ms)
    }

    pub fn final_frame_dwell(&self) -> Duration {
        Duration::from_millis(self.final_frame_dwell_ms)
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn loop_restart_delay(&self) -> Duration {
        Duration::from_millis(self.loop_restart_delay_ms)
    }

    /// Native seconds consumed by a symmetric S-curve ramp between pace and the primer rate
    ///
    /// The curve is point-symmetric about its midpoint, so the mean rate is the average
    /// of the two endpoints.
    pub fn ramp_native_secs(&self, wall: Duration) -> f64 {
        wall.as_secs_f64() * (self.pace + PRIMER_RATE) / 2.0
    }

    /// Wall-clock length of a ramp that consumes exactly `native_secs`
    pub fn ramp_wall_for(&self, native_secs: f64) -> Duration {
        let mean_rate = (self.pace + PRIMER_RATE) / 2.0;
        if native_secs <= 0.0 || mean_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(native_secs / mean_rate).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.pace.is_finite() || self.pace <= 0.0 {
            return Err(format!("playback pace must be positive, got {}", self.pace));
        }
        Ok(())
    }
}
