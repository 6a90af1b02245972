//! Live overlay set and per-overlay phase timers
//!
//! Each record owns one timer task, cancelled through its own token. Records never share
//! timers, so overlays fade independently. Every phase change is reported as an
//! [`OverlaySnapshot`] on the update channel, released outside the board lock.

use kiosk_common::events::{OverlayPhase, OverlaySnapshot};
use kiosk_common::ScreenIdentity;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::directive::OverlayDirective;
use super::record::{OverlayRecord, COMMIT_TICK_MS};

/// What a directive did to the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveOutcome {
    /// Addressed to other screens
    NotAddressed,
    /// Processed; `cleared` overlays were removed and `created` is the new record
    Applied { cleared: usize, created: Option<Uuid> },
}

/// Shared set of live overlays
#[derive(Clone)]
pub struct OverlayBoard {
    inner: Arc<Mutex<BoardInner>>,
    updates: mpsc::UnboundedSender<OverlaySnapshot>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct BoardInner {
    /// Keyed by arrival sequence so iteration yields stacking order
    live: BTreeMap<u64, LiveOverlay>,
    next_sequence: u64,
}

struct LiveOverlay {
    record: OverlayRecord,
    timer: CancellationToken,
}

impl OverlayBoard {
    pub fn new(updates: mpsc::UnboundedSender<OverlaySnapshot>, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoardInner::default())),
            updates,
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, snapshots: Vec<OverlaySnapshot>) {
        for snapshot in snapshots {
            let _ = self.updates.send(snapshot);
        }
    }

    /// Apply one inbound directive for `screen`
    ///
    /// A directive whose `html` is empty creates no record, so `{"clear": true}` on its
    /// own is a clear-only message rather than an invisible overlay with live timers.
    pub fn apply(&self, directive: &OverlayDirective, screen: &ScreenIdentity) -> DirectiveOutcome {
        if !directive.is_addressed_to(screen) {
            debug!(%screen, "Overlay directive addressed to other screens, ignoring");
            return DirectiveOutcome::NotAddressed;
        }

        let cleared = if directive.clear { self.clear() } else { 0 };

        if !directive.has_content() {
            debug!("Overlay directive without html, nothing to show");
            return DirectiveOutcome::Applied { cleared, created: None };
        }

        let created = self.create(directive);
        DirectiveOutcome::Applied {
            cleared,
            created: Some(created),
        }
    }

    /// Send every live overlay straight to `Removed`
    pub fn clear(&self) -> usize {
        let removed: Vec<LiveOverlay> = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.live).into_values().collect()
        };

        let snapshots = removed
            .into_iter()
            .map(|mut live| {
                live.timer.cancel();
                live.record.force_remove();
                live.record.snapshot()
            })
            .collect::<Vec<_>>();

        let count = snapshots.len();
        if count > 0 {
            info!(count, "Cleared live overlays");
        }
        self.publish(snapshots);
        count
    }

    fn create(&self, directive: &OverlayDirective) -> Uuid {
        let timer = self.cancel.child_token();

        let (record, snapshots) = {
            let mut inner = self.lock();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;

            let mut record = OverlayRecord::from_directive(directive, sequence);
            let mut snapshots = vec![record.snapshot()];
            if record.fade_in_ms == 0 {
                // Nothing to animate: no commit tick needed
                record.advance(OverlayPhase::Visible);
                snapshots.push(record.snapshot());
            }

            inner.live.insert(
                sequence,
                LiveOverlay {
                    record: record.clone(),
                    timer: timer.clone(),
                },
            );
            (record, snapshots)
        };

        info!(
            id = %record.id,
            position = ?record.position,
            visible_ms = record.visible_duration_ms,
            fade_in_ms = record.fade_in_ms,
            "Overlay created"
        );
        self.publish(snapshots);

        tokio::spawn(drive_lifecycle(
            self.clone(),
            record.sequence,
            record.created_at,
            record.fade_in_ms,
            record.visible_duration_ms,
            record.fade_out_ms,
            timer,
        ));
        record.id
    }

    /// Advance one record; stale or backwards transitions are ignored
    fn transition(&self, sequence: u64, next: OverlayPhase) {
        let snapshot = {
            let mut inner = self.lock();
            let Some(live) = inner.live.get_mut(&sequence) else {
                return;
            };
            if !live.record.advance(next) {
                return;
            }
            let snapshot = live.record.snapshot();
            if !next.is_live() {
                inner.live.remove(&sequence);
            }
            snapshot
        };

        debug!(id = %snapshot.id, phase = ?snapshot.phase, "Overlay phase changed");
        self.publish(vec![snapshot]);
    }

    /// Live records in stacking order (earliest first), phases as of now
    pub fn live(&self) -> Vec<OverlayRecord> {
        let now = Instant::now();
        self.lock()
            .live
            .values()
            .map(|live| {
                let mut record = live.record.clone();
                record.phase = record.effective_phase(now);
                record
            })
            .collect()
    }

    /// Render-facing views of the live overlays in stacking order
    pub fn snapshots(&self) -> Vec<OverlaySnapshot> {
        self.lock().live.values().map(|live| live.record.snapshot()).collect()
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Cancel every timer and forget all overlays without publishing
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        for live in inner.live.values() {
            live.timer.cancel();
        }
        inner.live.clear();
    }
}

/// Timer task for one overlay
///
/// Deadlines are measured from creation, so `FadingOut` lands at `visible_ms` and
/// `Removed` at `visible_ms + fade_out_ms` regardless of the commit tick.
async fn drive_lifecycle(
    board: OverlayBoard,
    sequence: u64,
    created_at: Instant,
    fade_in_ms: u64,
    visible_ms: u64,
    fade_out_ms: u64,
    timer: CancellationToken,
) {
    let wait = |deadline: Instant| {
        let timer = timer.clone();
        async move {
            tokio::select! {
                _ = timer.cancelled() => false,
                _ = sleep_until(deadline) => true,
            }
        }
    };

    if fade_in_ms > 0 {
        if !wait(created_at + Duration::from_millis(COMMIT_TICK_MS)).await {
            return;
        }
        board.transition(sequence, OverlayPhase::FadingIn);
    }

    let fade_out_at = created_at + Duration::from_millis(visible_ms);
    if !wait(fade_out_at).await {
        return;
    }
    board.transition(sequence, OverlayPhase::FadingOut);

    if !wait(fade_out_at + Duration::from_millis(fade_out_ms)).await {
        return;
    }
    board.transition(sequence, OverlayPhase::Removed);
}
