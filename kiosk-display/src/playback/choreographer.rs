//! Seamless looped playback choreography
//!
//! One cycle runs `Primer → EasingIn → Hold → EasingOut → PausedOnFinalFrame →
//! Crossfading → HoldingStill` and then starts over from `Primer`. Rate ramps are sampled
//! per frame along the S-curve, so the rate has zero slope where each ramp meets a
//! constant phase.
//!
//! # Single writer
//!
//! Each call to [`PlaybackChoreographer::start`] bumps a generation counter and spawns one
//! cycle task holding that generation. Before touching the media element the task checks
//! that its generation is still live and its cancellation token untripped. Teardown
//! cancels the token and awaits the task, so by the time a new generation begins the old
//! one can no longer write.

use chrono::{DateTime, Utc};
use kiosk_common::ease::EaseCurve;
use kiosk_common::events::{EventBus, KioskEvent, PlaybackPhase};
use kiosk_common::time::{now, progress};
use kiosk_common::AssetReference;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::media::{MediaElement, MediaMetadata};
use super::rate::{clamp_rate, PRIMER_RATE};
use super::timings::PlaybackTimings;
use crate::error::{Error, Result};

/// Ramp sampling period (one display frame at ~60 Hz)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Native seconds left unplayed at the end of the ease-out to absorb sampling error
fn end_margin_secs(pace: f64) -> f64 {
    2.0 * pace * FRAME_INTERVAL.as_secs_f64()
}

/// The cycle currently running for the active video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackCycle {
    pub phase: PlaybackPhase,
    pub rate: f64,
    pub started_at: DateTime<Utc>,
    /// Completed loops since the asset was loaded
    pub loop_count: u64,
}

/// Target opacity of the first-frame still laid over the video
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StillCover {
    pub opacity: f64,
    pub transition_ms: u64,
}

/// Latest choreography state, observable through [`PlaybackChoreographer::subscribe`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChoreographyState {
    pub generation: u64,
    pub asset: Option<AssetReference>,
    pub cycle: Option<PlaybackCycle>,
    pub cover: StillCover,
}

/// Owns the cycle task for whichever video is on screen
pub struct PlaybackChoreographer {
    element: Arc<dyn MediaElement>,
    timings: PlaybackTimings,
    bus: EventBus,
    state: Arc<watch::Sender<ChoreographyState>>,
    live_generation: Arc<AtomicU64>,
    parent: CancellationToken,
    active: Option<ActiveCycle>,
}

struct ActiveCycle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PlaybackChoreographer {
    pub fn new(
        element: Arc<dyn MediaElement>,
        timings: PlaybackTimings,
        bus: EventBus,
        parent: CancellationToken,
    ) -> Result<Self> {
        timings.validate().map_err(Error::Config)?;
        let (state, _) = watch::channel(ChoreographyState::default());
        Ok(Self {
            element,
            timings,
            bus,
            state: Arc::new(state),
            live_generation: Arc::new(AtomicU64::new(0)),
            parent,
            active: None,
        })
    }

    /// Tear down any running cycle, load `asset` and start looping it from `Primer`
    ///
    /// Returns the new generation.
    pub async fn start(
        &mut self,
        asset: AssetReference,
        metadata: MediaMetadata,
        has_still: bool,
    ) -> Result<u64> {
        self.teardown().await;

        let generation = self.live_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.element.load(&asset, &metadata).await?;

        self.state.send_replace(ChoreographyState {
            generation,
            asset: Some(asset.clone()),
            cycle: None,
            cover: StillCover::default(),
        });

        let cancel = self.parent.child_token();
        let runner = CycleRunner {
            element: Arc::clone(&self.element),
            timings: self.timings.clone(),
            bus: self.bus.clone(),
            state: Arc::clone(&self.state),
            generation,
            live_generation: Arc::clone(&self.live_generation),
            cancel: cancel.clone(),
            duration_secs: metadata.duration_secs,
            has_still,
        };

        info!(
            url = %asset.url,
            generation,
            duration_secs = metadata.duration_secs,
            has_still,
            "Choreography started"
        );
        let handle = tokio::spawn(runner.run());
        self.active = Some(ActiveCycle { cancel, handle });
        Ok(generation)
    }

    /// Cancel the running cycle and wait until it can no longer touch the element
    ///
    /// Safe to call when nothing is running.
    pub async fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.handle.await {
            warn!(error = %e, "Choreography task ended abnormally");
        }

        let generation = self.live_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ChoreographyState {
            generation,
            ..Default::default()
        });
        debug!(generation, "Choreography torn down");
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.live_generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ChoreographyState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChoreographyState> {
        self.state.subscribe()
    }

    pub fn timings(&self) -> &PlaybackTimings {
        &self.timings
    }
}

impl Drop for PlaybackChoreographer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.handle.abort();
        }
    }
}

/// Why a cycle stopped early
enum Interrupt {
    Cancelled,
    Media(Error),
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Interrupt::Media(e)
    }
}

type Step<T = ()> = std::result::Result<T, Interrupt>;

/// Hold length and (possibly shortened) ease-out for the content left at Hold start
///
/// `remaining_native` is in native seconds. When it cannot absorb a full ease-out the
/// hold is skipped and the ease-out shrinks so that it still ends before the clip does.
pub(crate) fn plan_hold(timings: &PlaybackTimings, remaining_native: f64) -> (Duration, Duration) {
    let full_ease_out = timings.ease_out();
    let ease_out_native = timings.ramp_native_secs(full_ease_out);

    if remaining_native >= ease_out_native {
        let hold_secs = (remaining_native - ease_out_native) / timings.pace;
        let hold = Duration::try_from_secs_f64(hold_secs).unwrap_or(Duration::ZERO);
        (hold, full_ease_out)
    } else {
        (Duration::ZERO, timings.ramp_wall_for(remaining_native).min(full_ease_out))
    }
}

struct CycleRunner {
    element: Arc<dyn MediaElement>,
    timings: PlaybackTimings,
    bus: EventBus,
    state: Arc<watch::Sender<ChoreographyState>>,
    generation: u64,
    live_generation: Arc<AtomicU64>,
    cancel: CancellationToken,
    duration_secs: f64,
    has_still: bool,
}

impl CycleRunner {
    async fn run(self) {
        let mut loop_count = 0u64;
        loop {
            match self.cycle(loop_count).await {
                Ok(()) => {}
                Err(Interrupt::Cancelled) => break,
                Err(Interrupt::Media(e)) => {
                    warn!(generation = self.generation, error = %e, "Playback cycle failed, restarting");
                    if self.pause_for(self.timings.loop_restart_delay()).await.is_err() {
                        break;
                    }
                }
            }
            loop_count += 1;
        }
        debug!(generation = self.generation, loop_count, "Choreography loop exited");
    }

    async fn cycle(&self, loop_count: u64) -> Step {
        let pace = self.timings.pace;

        self.enter(PlaybackPhase::Primer, PRIMER_RATE, loop_count)?;
        self.media(self.element.pause()).await?;
        self.apply_rate(PRIMER_RATE).await?;
        self.media(self.element.seek(0.0)).await?;
        if loop_count > 0 && self.has_still {
            // Video is back on frame 0 underneath; reveal it
            self.set_cover(0.0, self.timings.still_fade_out_ms)?;
        }
        self.media(self.element.play()).await?;
        self.pause_for(self.timings.primer()).await?;

        self.enter(PlaybackPhase::EasingIn, PRIMER_RATE, loop_count)?;
        self.ramp(PRIMER_RATE, pace, self.timings.ease_in()).await?;

        let remaining =
            (self.duration_secs - self.element.current_time() - end_margin_secs(pace)).max(0.0);
        let (hold, ease_out) = plan_hold(&self.timings, remaining);
        debug!(
            generation = self.generation,
            remaining_native_secs = remaining,
            hold_ms = hold.as_millis() as u64,
            ease_out_ms = ease_out.as_millis() as u64,
            "Hold budget"
        );

        self.enter(PlaybackPhase::Hold, pace, loop_count)?;
        self.pause_for(hold).await?;

        self.enter(PlaybackPhase::EasingOut, pace, loop_count)?;
        self.ramp(pace, PRIMER_RATE, ease_out).await?;

        self.media(self.element.pause()).await?;
        self.enter(PlaybackPhase::PausedOnFinalFrame, PRIMER_RATE, loop_count)?;
        self.pause_for(self.timings.final_frame_dwell()).await?;

        if !self.has_still {
            return Ok(());
        }

        self.enter(PlaybackPhase::Crossfading, PRIMER_RATE, loop_count)?;
        self.set_cover(1.0, self.timings.crossfade_ms)?;
        self.pause_for(self.timings.crossfade()).await?;

        self.enter(PlaybackPhase::HoldingStill, PRIMER_RATE, loop_count)?;
        self.pause_for(self.timings.loop_restart_delay()).await?;
        Ok(())
    }

    fn ensure_current(&self) -> Step {
        if self.cancel.is_cancelled()
            || self.live_generation.load(Ordering::SeqCst) != self.generation
        {
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }

    /// Await `fut` unless the cycle is cancelled first
    async fn guard<F: Future>(&self, fut: F) -> Step<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Run one element call if this generation is still live
    async fn media<F>(&self, fut: F) -> Step
    where
        F: Future<Output = Result<()>>,
    {
        self.ensure_current()?;
        self.guard(fut).await??;
        Ok(())
    }

    async fn pause_for(&self, duration: Duration) -> Step {
        self.guard(sleep(duration)).await
    }

    async fn apply_rate(&self, rate: f64) -> Step<f64> {
        let rate = clamp_rate(rate);
        self.media(self.element.set_playback_rate(rate)).await?;
        self.state.send_modify(|state| {
            if let Some(cycle) = state.cycle.as_mut() {
                cycle.rate = rate;
            }
        });
        Ok(rate)
    }

    /// Sample the S-curve from `from` to `to` once per frame over `duration`
    async fn ramp(&self, from: f64, to: f64, duration: Duration) -> Step {
        let start = Instant::now();
        let deadline = start + duration;
        loop {
            let at = Instant::now();
            let fraction = progress(at.saturating_duration_since(start), duration);
            self.apply_rate(EaseCurve::SCurve.interpolate(from, to, fraction))
                .await?;
            if fraction >= 1.0 {
                return Ok(());
            }
            self.guard(sleep_until((at + FRAME_INTERVAL).min(deadline))).await?;
        }
    }

    fn enter(&self, phase: PlaybackPhase, rate: f64, loop_count: u64) -> Step {
        self.ensure_current()?;
        let rate = clamp_rate(rate);
        let cycle = PlaybackCycle {
            phase,
            rate,
            started_at: now(),
            loop_count,
        };
        self.state.send_modify(|state| state.cycle = Some(cycle));
        self.bus.emit_lossy(KioskEvent::PlaybackPhaseChanged {
            phase,
            rate,
            timestamp: now(),
        });
        debug!(generation = self.generation, ?phase, rate, loop_count, "Playback phase");
        Ok(())
    }

    fn set_cover(&self, opacity: f64, transition_ms: u64) -> Step {
        self.ensure_current()?;
        let cover = StillCover {
            opacity,
            transition_ms,
        };
        self.state.send_modify(|state| state.cover = cover);
        self.bus.emit_lossy(KioskEvent::StillCoverChanged {
            opacity,
            transition_ms,
            timestamp: now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock_element::RemoteMediaElement;
    use crate::playback::rate::{MAX_RATE, MIN_RATE};
    use kiosk_common::events::MediaCommand;
    use tokio::sync::broadcast;

    struct Rig {
        choreographer: PlaybackChoreographer,
        element: Arc<RemoteMediaElement>,
        rx: broadcast::Receiver<KioskEvent>,
    }

    fn rig() -> Rig {
        let bus = EventBus::new(8192);
        let rx = bus.subscribe();
        let element = Arc::new(RemoteMediaElement::new(bus.clone()));
        let choreographer = PlaybackChoreographer::new(
            element.clone(),
            PlaybackTimings::default(),
            bus,
            CancellationToken::new(),
        )
        .unwrap();
        Rig {
            choreographer,
            element,
            rx,
        }
    }

    fn video(name: &str) -> AssetReference {
        AssetReference::parse(&format!("http://media.local/{name}.mp4")).unwrap()
    }

    fn metadata(duration_secs: f64) -> MediaMetadata {
        MediaMetadata {
            duration_secs,
            ..Default::default()
        }
    }

    /// Collect phase changes (with elapsed ms) until `stop` is seen `stop_count` times
    async fn phases_until(
        rx: &mut broadcast::Receiver<KioskEvent>,
        start: Instant,
        stop: PlaybackPhase,
        stop_count: usize,
    ) -> Vec<(PlaybackPhase, u128)> {
        let mut seen = Vec::new();
        let mut hits = 0;
        loop {
            match rx.recv().await {
                Ok(KioskEvent::PlaybackPhaseChanged { phase, .. }) => {
                    seen.push((phase, start.elapsed().as_millis()));
                    if phase == stop {
                        hits += 1;
                        if hits == stop_count {
                            return seen;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    }

    #[test]
    fn test_plan_hold_full_ease_out() {
        let timings = PlaybackTimings::default();
        let ease_out_native = timings.ramp_native_secs(timings.ease_out());
        let (hold, ease_out) = plan_hold(&timings, ease_out_native + 7.0);
        assert_eq!(ease_out, timings.ease_out());
        assert!((hold.as_secs_f64() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_plan_hold_shortens_ease_out() {
        let timings = PlaybackTimings::default();
        let (hold, ease_out) = plan_hold(&timings, 0.3825);
        assert_eq!(hold, Duration::ZERO);
        assert!((ease_out.as_secs_f64() - 1.0).abs() < 1e-6);

        let (hold, ease_out) = plan_hold(&timings, 0.0);
        assert_eq!((hold, ease_out), (Duration::ZERO, Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_phase_order_and_fixed_dwells() {
        let mut rig = rig();
        let start = Instant::now();
        rig.choreographer
            .start(video("loop"), metadata(20.0), true)
            .await
            .unwrap();

        let seen = phases_until(&mut rig.rx, start, PlaybackPhase::Primer, 2).await;
        let phases: Vec<_> = seen.iter().map(|(phase, _)| *phase).collect();
        assert_eq!(
            phases,
            vec![
                PlaybackPhase::Primer,
                PlaybackPhase::EasingIn,
                PlaybackPhase::Hold,
                PlaybackPhase::EasingOut,
                PlaybackPhase::PausedOnFinalFrame,
                PlaybackPhase::Crossfading,
                PlaybackPhase::HoldingStill,
                PlaybackPhase::Primer,
            ]
        );

        let at = |i: usize| seen[i].1;
        assert_eq!(at(0), 0);
        assert_eq!(at(1), 1500);
        assert_eq!(at(2), 4000);
        assert!(at(3) > at(2));
        assert!((at(4) - at(3)).abs_diff(2500) <= 1);
        assert_eq!(at(5) - at(4), 4000);
        assert_eq!(at(6) - at(5), 8000);
        assert_eq!(at(7) - at(6), 2000);
        assert_eq!(rig.choreographer.state().cycle.unwrap().loop_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ease_out_ends_before_clip_end() {
        for duration in [1.2, 3.0, 10.0, 60.0] {
            let mut rig = rig();
            let start = Instant::now();
            rig.choreographer
                .start(video("clip"), metadata(duration), false)
                .await
                .unwrap();

            phases_until(&mut rig.rx, start, PlaybackPhase::PausedOnFinalFrame, 1).await;
            let position = rig.element.current_time();
            assert!(!rig.element.reached_end(), "clip {duration}s ran out before ease-out finished");
            assert!(position < duration, "clip {duration}s: position {position}");
            assert!(position > duration - 0.05, "clip {duration}s: position {position}");
            rig.choreographer.teardown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rates_stay_in_limits_and_ramps_are_monotonic() {
        let mut rig = rig();
        let start = Instant::now();
        rig.choreographer
            .start(video("loop"), metadata(8.0), false)
            .await
            .unwrap();

        let mut phase = None;
        let mut ease_in_rates = Vec::new();
        loop {
            let elapsed = start.elapsed();
            match rig.rx.recv().await.unwrap() {
                KioskEvent::PlaybackPhaseChanged { phase: next, .. } => {
                    if next == PlaybackPhase::PausedOnFinalFrame {
                        break;
                    }
                    phase = Some(next);
                }
                KioskEvent::MediaCommand {
                    command: MediaCommand::SetRate { rate },
                    ..
                } => {
                    assert!((MIN_RATE..=MAX_RATE).contains(&rate), "rate {rate} at {elapsed:?}");
                    if phase == Some(PlaybackPhase::EasingIn) {
                        ease_in_rates.push(rate);
                    }
                }
                _ => {}
            }
        }

        assert!(ease_in_rates.len() > 100);
        assert!(ease_in_rates.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(ease_in_rates.first().copied(), Some(PRIMER_RATE));
        assert!((ease_in_rates.last().unwrap() - 0.7).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_still_restarts_after_dwell() {
        let mut rig = rig();
        let start = Instant::now();
        rig.choreographer
            .start(video("loop"), metadata(6.0), false)
            .await
            .unwrap();

        let seen = phases_until(&mut rig.rx, start, PlaybackPhase::Primer, 2).await;
        let n = seen.len();
        assert_eq!(seen[n - 2].0, PlaybackPhase::PausedOnFinalFrame);
        assert_eq!(seen[n - 1].1 - seen[n - 2].1, 4000);
        assert!(!seen.iter().any(|(p, _)| *p == PlaybackPhase::Crossfading));
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_cover_fades_in_then_out() {
        let mut rig = rig();
        rig.choreographer
            .start(video("loop"), metadata(5.0), true)
            .await
            .unwrap();

        let mut covers = Vec::new();
        while covers.len() < 2 {
            if let KioskEvent::StillCoverChanged { opacity, transition_ms, .. } =
                rig.rx.recv().await.unwrap()
            {
                covers.push((opacity, transition_ms));
            }
        }
        assert_eq!(covers, vec![(1.0, 8000), (0.0, 1000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_silences_old_cycle() {
        let mut rig = rig();
        rig.choreographer
            .start(video("old"), metadata(30.0), true)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(
            rig.choreographer.state().cycle.map(|c| c.phase),
            Some(PlaybackPhase::EasingIn)
        );

        rig.choreographer.teardown().await;
        assert!(!rig.choreographer.is_active());
        while rig.rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(matches!(
            rig.rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(rig.choreographer.state().cycle.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_mid_ease_out_begins_fresh() {
        let mut rig = rig();
        let first = rig
            .choreographer
            .start(video("old"), metadata(4.0), true)
            .await
            .unwrap();
        let start = Instant::now();
        phases_until(&mut rig.rx, start, PlaybackPhase::EasingOut, 1).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let second = rig
            .choreographer
            .start(video("new"), metadata(12.0), true)
            .await
            .unwrap();
        assert!(second > first);

        // Everything after the swap belongs to the new asset, starting from Primer
        let mut saw_load = false;
        let mut phases = Vec::new();
        while phases.len() < 2 {
            match rig.rx.recv().await.unwrap() {
                KioskEvent::MediaCommand {
                    command: MediaCommand::Load { url, .. },
                    ..
                } => {
                    assert!(url.ends_with("new.mp4"));
                    saw_load = true;
                }
                KioskEvent::MediaCommand { .. } => {}
                KioskEvent::PlaybackPhaseChanged { phase, .. } => {
                    assert!(saw_load, "phase {phase:?} arrived before the new load");
                    phases.push(phase);
                }
                _ => {}
            }
        }
        assert_eq!(phases, vec![PlaybackPhase::Primer, PlaybackPhase::EasingIn]);

        let state = rig.choreographer.state();
        assert_eq!(state.generation, second);
        assert!(state.asset.unwrap().url.ends_with("new.mp4"));
    }
}
