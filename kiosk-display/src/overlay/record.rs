//! Overlay records and their phase bookkeeping

use kiosk_common::events::{OverlayPhase, OverlaySnapshot, PositionSlot};
use kiosk_common::ScreenIdentity;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::directive::{millis_or, OverlayDirective};

/// Visible duration when a directive does not name one
pub const DEFAULT_VISIBLE_DURATION_MS: u64 = 5000;

/// Fade-in length when a directive does not name one
pub const DEFAULT_FADE_IN_MS: u64 = 2000;

/// Fixed fade-out length
pub const OVERLAY_FADE_OUT_MS: u64 = 5000;

/// Delay between creation and the start of the fade-in, so the transparent
/// initial frame is committed before it animates
pub const COMMIT_TICK_MS: u64 = 50;

/// One transient overlay
#[derive(Debug, Clone)]
pub struct OverlayRecord {
    pub id: Uuid,
    pub html: String,
    pub position: Option<PositionSlot>,
    pub visible_duration_ms: u64,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    pub phase: OverlayPhase,
    pub target_screens: Option<HashSet<ScreenIdentity>>,
    /// Arrival order on the channel
    pub sequence: u64,
    pub created_at: Instant,
    fade_in_started_at: Option<Instant>,
}

impl OverlayRecord {
    pub fn from_directive(directive: &OverlayDirective, sequence: u64) -> Self {
        let target_screens = directive
            .screens
            .as_ref()
            .filter(|screens| !screens.is_empty())
            .map(|screens| {
                screens
                    .iter()
                    .filter_map(|s| ScreenIdentity::new(s.as_str()).ok())
                    .collect()
            });

        Self {
            id: Uuid::new_v4(),
            html: directive.html.clone(),
            position: directive.position_slot(),
            visible_duration_ms: millis_or(directive.duration, DEFAULT_VISIBLE_DURATION_MS),
            fade_in_ms: millis_or(directive.fadein_ms, DEFAULT_FADE_IN_MS),
            fade_out_ms: OVERLAY_FADE_OUT_MS,
            phase: OverlayPhase::Created,
            target_screens,
            sequence,
            created_at: Instant::now(),
            fade_in_started_at: None,
        }
    }

    /// Move forward to `next`; returns false (and changes nothing) otherwise
    pub fn advance(&mut self, next: OverlayPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            return false;
        }
        if next == OverlayPhase::FadingIn {
            self.fade_in_started_at = Some(Instant::now());
        }
        self.phase = next;
        true
    }

    /// Jump straight to `Removed`, skipping any fade-out
    pub fn force_remove(&mut self) -> bool {
        if self.phase == OverlayPhase::Removed {
            return false;
        }
        self.phase = OverlayPhase::Removed;
        true
    }

    /// Phase as seen at `now`
    ///
    /// `FadingIn` becomes `Visible` once the fade-in has had time to complete; that step
    /// is tracked by time rather than by its own timer.
    pub fn effective_phase(&self, now: Instant) -> OverlayPhase {
        match (self.phase, self.fade_in_started_at) {
            (OverlayPhase::FadingIn, Some(started))
                if now.saturating_duration_since(started)
                    >= Duration::from_millis(self.fade_in_ms) =>
            {
                OverlayPhase::Visible
            }
            (phase, _) => phase,
        }
    }

    /// Opacity at `now`, following the fade the front-end is animating
    pub fn opacity(&self, now: Instant) -> f64 {
        match self.phase {
            OverlayPhase::Created | OverlayPhase::Removed => 0.0,
            OverlayPhase::Visible => 1.0,
            OverlayPhase::FadingIn => match self.fade_in_started_at {
                Some(started) => kiosk_common::time::progress(
                    now.saturating_duration_since(started),
                    Duration::from_millis(self.fade_in_ms),
                ),
                None => 0.0,
            },
            OverlayPhase::FadingOut => {
                let fade_out_start =
                    self.created_at + Duration::from_millis(self.visible_duration_ms);
                1.0 - kiosk_common::time::progress(
                    now.saturating_duration_since(fade_out_start),
                    Duration::from_millis(self.fade_out_ms),
                )
            }
        }
    }

    /// Render-facing view: target opacity plus the transition that reaches it
    ///
    /// The phase is resolved at read time, so a finished fade-in reads as `Visible`.
    pub fn snapshot(&self) -> OverlaySnapshot {
        let phase = self.effective_phase(Instant::now());
        let (target_opacity, transition_ms) = match phase {
            OverlayPhase::Created => (0.0, 0),
            OverlayPhase::FadingIn => (1.0, self.fade_in_ms),
            OverlayPhase::Visible => (1.0, 0),
            OverlayPhase::FadingOut => (0.0, self.fade_out_ms),
            OverlayPhase::Removed => (0.0, 0),
        };

        OverlaySnapshot {
            id: self.id,
            html: self.html.clone(),
            position: self.position,
            phase,
            target_opacity,
            transition_ms,
            sequence: self.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> OverlayRecord {
        OverlayRecord::from_directive(&OverlayDirective::parse(json).unwrap(), 1)
    }

    #[test]
    fn test_defaults_applied() {
        let rec = record(r#"{"html":"x"}"#);
        assert_eq!(rec.visible_duration_ms, 5000);
        assert_eq!(rec.fade_in_ms, 2000);
        assert_eq!(rec.fade_out_ms, 5000);
        assert_eq!(rec.phase, OverlayPhase::Created);
        assert!(rec.target_screens.is_none());
    }

    #[test]
    fn test_zero_fade_in_kept() {
        let rec = record(r#"{"html":"x","fadeinMs":0,"duration":1000}"#);
        assert_eq!(rec.fade_in_ms, 0);
        assert_eq!(rec.visible_duration_ms, 1000);
    }

    #[test]
    fn test_target_screens_recorded() {
        let rec = record(r#"{"html":"x","screens":["A","B"]}"#);
        let screens = rec.target_screens.unwrap();
        assert!(screens.contains(&ScreenIdentity::new("A").unwrap()));
        assert_eq!(screens.len(), 2);
    }

    #[test]
    fn test_advance_is_forward_only() {
        let mut rec = record(r#"{"html":"x"}"#);
        assert!(rec.advance(OverlayPhase::FadingIn));
        assert!(rec.advance(OverlayPhase::FadingOut));
        assert!(!rec.advance(OverlayPhase::Visible));
        assert!(!rec.advance(OverlayPhase::FadingIn));
        assert_eq!(rec.phase, OverlayPhase::FadingOut);
    }

    #[test]
    fn test_force_remove_skips_fade_out() {
        let mut rec = record(r#"{"html":"x"}"#);
        rec.advance(OverlayPhase::FadingIn);
        assert!(rec.force_remove());
        assert_eq!(rec.phase, OverlayPhase::Removed);
        assert!(!rec.force_remove());
        assert!(!rec.advance(OverlayPhase::FadingOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fading_in_becomes_visible_by_time() {
        let mut rec = record(r#"{"html":"x","fadeinMs":400}"#);
        rec.advance(OverlayPhase::FadingIn);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(rec.effective_phase(Instant::now()), OverlayPhase::FadingIn);
        assert!((rec.opacity(Instant::now()) - 0.5).abs() < 1e-9);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(rec.effective_phase(Instant::now()), OverlayPhase::Visible);
        assert_eq!(rec.opacity(Instant::now()), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_finished_fade_in_as_visible() {
        let mut rec = record(r#"{"html":"x","fadeinMs":300}"#);
        rec.advance(OverlayPhase::FadingIn);
        assert_eq!(rec.snapshot().phase, OverlayPhase::FadingIn);

        tokio::time::advance(Duration::from_millis(300)).await;
        let snapshot = rec.snapshot();
        assert_eq!(snapshot.phase, OverlayPhase::Visible);
        assert_eq!((snapshot.target_opacity, snapshot.transition_ms), (1.0, 0));
        assert_eq!(rec.phase, OverlayPhase::FadingIn, "stored phase only moves on timers");
    }

    #[test]
    fn test_snapshot_targets() {
        let mut rec = record(r#"{"html":"x","fadeinMs":300}"#);
        let created = rec.snapshot();
        assert_eq!((created.target_opacity, created.transition_ms), (0.0, 0));

        rec.advance(OverlayPhase::FadingIn);
        let fading_in = rec.snapshot();
        assert_eq!((fading_in.target_opacity, fading_in.transition_ms), (1.0, 300));

        rec.advance(OverlayPhase::FadingOut);
        let fading_out = rec.snapshot();
        assert_eq!((fading_out.target_opacity, fading_out.transition_ms), (0.0, 5000));
    }
}
