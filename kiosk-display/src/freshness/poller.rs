//! Self-paced freshness polling loop
//!
//! One poller watches one URL at a time. The next tick is armed only after the previous
//! probe settles, so the effective period is never shorter than the configured interval
//! and slow networks cannot queue probes up. Manual checks share the same in-flight
//! flag: a check that finds a probe outstanding is skipped, never stacked.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::probe::FreshnessProbe;
use super::state::{FreshnessEvent, FreshnessState};

/// Result of one polling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// First token stored, no event
    Primed,
    Unchanged,
    Changed,
    /// Probe unsupported, one-time initial render requested
    ForcedRefresh,
    /// Probe failed; polling continues
    Failed,
    /// Another probe was still in flight
    Skipped,
    /// The poller was stopped or restarted meanwhile
    Stale,
}

/// Polls one asset URL for freshness changes
pub struct AssetFreshnessPoller {
    probe: Arc<dyn FreshnessProbe>,
    events: mpsc::Sender<FreshnessEvent>,
    parent: CancellationToken,
    active: Option<ActivePoll>,
}

struct ActivePoll {
    interval: Duration,
    core: Arc<PollCore>,
    handle: JoinHandle<()>,
}

struct PollCore {
    url: String,
    probe: Arc<dyn FreshnessProbe>,
    state: Mutex<FreshnessState>,
    events: mpsc::Sender<FreshnessEvent>,
    cancel: CancellationToken,
}

/// Cloneable handle for manual checks against the currently watched URL
#[derive(Clone)]
pub struct PollHandle {
    core: Arc<PollCore>,
}

impl AssetFreshnessPoller {
    /// Create an idle poller
    ///
    /// `parent` is the owner's cancellation token; cancelling it stops any running loop.
    pub fn new(
        probe: Arc<dyn FreshnessProbe>,
        events: mpsc::Sender<FreshnessEvent>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            probe,
            events,
            parent,
            active: None,
        }
    }

    /// Begin polling `asset_url` every `interval`
    ///
    /// Restarting on a different URL discards the freshness state, so the next probe is a
    /// cold start again. Restarting on the same URL only re-arms the interval.
    pub fn start(&mut self, asset_url: &str, interval: Duration) {
        let retained_core = match self.active.take() {
            Some(active) if active.core.url == asset_url => {
                if active.interval == interval && !active.handle.is_finished() {
                    self.active = Some(active);
                    return;
                }
                // Same URL, new interval: keep the token, replace the loop
                active.handle.abort();
                active.core.cancel.cancel();
                Some(active.core.state_snapshot())
            }
            Some(active) => {
                info!(from = %active.core.url, to = %asset_url, "Freshness poller switching URL");
                active.core.cancel.cancel();
                active.handle.abort();
                None
            }
            None => None,
        };

        let mut state = retained_core.unwrap_or_default();
        state.is_check_in_flight = false;

        let core = Arc::new(PollCore {
            url: asset_url.to_string(),
            probe: Arc::clone(&self.probe),
            state: Mutex::new(state),
            events: self.events.clone(),
            cancel: self.parent.child_token(),
        });

        info!(url = %asset_url, interval_secs = interval.as_secs_f64(), "Freshness poller started");
        let handle = tokio::spawn(run_loop(Arc::clone(&core), interval));
        self.active = Some(ActivePoll {
            interval,
            core,
            handle,
        });
    }

    /// Cancel polling; calling again is a no-op
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.core.cancel.cancel();
            active.handle.abort();
            info!(url = %active.core.url, "Freshness poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// URL currently being watched
    pub fn url(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.core.url.as_str())
    }

    pub fn state(&self) -> Option<FreshnessState> {
        self.active.as_ref().map(|active| active.core.state_snapshot())
    }

    /// Handle for manual checks, if polling is active
    pub fn handle(&self) -> Option<PollHandle> {
        self.active.as_ref().map(|active| PollHandle {
            core: Arc::clone(&active.core),
        })
    }
}

impl Drop for AssetFreshnessPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PollHandle {
    /// Probe now, unless a probe is already in flight
    pub async fn check_now(&self) -> TickOutcome {
        self.core.tick().await
    }

    pub fn url(&self) -> &str {
        &self.core.url
    }
}

async fn run_loop(core: Arc<PollCore>, interval: Duration) {
    loop {
        let outcome = tokio::select! {
            _ = core.cancel.cancelled() => break,
            outcome = core.tick() => outcome,
        };
        debug!(url = %core.url, ?outcome, "Freshness tick");

        tokio::select! {
            _ = core.cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(url = %core.url, "Freshness loop exited");
}

/// Clears the in-flight flag even when the probe future is dropped mid-flight
struct InFlightGuard<'a> {
    core: &'a PollCore,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.core.lock_state().is_check_in_flight = false;
    }
}

impl PollCore {
    fn lock_state(&self) -> MutexGuard<'_, FreshnessState> {
        // State holds plain data; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_snapshot(&self) -> FreshnessState {
        self.lock_state().clone()
    }

    async fn tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Stale;
        }

        {
            let mut state = self.lock_state();
            if state.is_check_in_flight {
                debug!(url = %self.url, "Probe still in flight, skipping tick");
                return TickOutcome::Skipped;
            }
            state.is_check_in_flight = true;
        }

        let guard = InFlightGuard { core: self };
        let result = self.probe.probe(&self.url).await;
        drop(guard);

        if self.cancel.is_cancelled() {
            return TickOutcome::Stale;
        }

        let (event, outcome) = {
            let mut state = self.lock_state();
            match result {
                Ok(token) => {
                    let event = state.observe(&self.url, token);
                    let outcome = match &event {
                        None => TickOutcome::Primed,
                        Some(FreshnessEvent::Unchanged { .. }) => TickOutcome::Unchanged,
                        Some(FreshnessEvent::Changed { .. }) => TickOutcome::Changed,
                        Some(FreshnessEvent::ForcedRefresh { .. }) => TickOutcome::ForcedRefresh,
                    };
                    (event, outcome)
                }
                Err(error) => {
                    warn!(url = %self.url, %error, "Freshness probe failed");
                    match state.observe_failure(&self.url, &error) {
                        Some(event) => (Some(event), TickOutcome::ForcedRefresh),
                        None => (None, TickOutcome::Failed),
                    }
                }
            }
        };

        if let Some(event) = event {
            if let FreshnessEvent::Changed { token, .. } = &event {
                info!(url = %self.url, %token, "Asset changed");
            }
            if self.events.send(event).await.is_err() {
                debug!(url = %self.url, "Freshness receiver dropped");
            }
        }
        outcome
    }
}
