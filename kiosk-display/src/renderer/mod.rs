//! Display renderer orchestration
//!
//! Wires one screen to a freshness poller, an overlay channel and a playback
//! choreographer, and folds their outputs into the [`Scene`].
//!
//! # Event loop
//!
//! A single task owns every component and reacts to, in any order:
//! - freshness events (asset changed / forced initial render)
//! - overlay snapshots from the board
//! - push-channel connection state
//! - choreography state
//! - prepared media (inspection and still capture, run off the loop)
//! - commands from the HTTP layer
//!
//! Media and overlay streams are independent; nothing here assumes an interleaving.
//! Inspecting a new asset can take as long as the media tools' timeout, so it runs in
//! its own task and only the swap happens on the loop. Each request carries a
//! generation; results from superseded requests are dropped.

mod scene;

pub use scene::{MediaLayer, RetainedFailure, Scene, SceneSnapshot, SharedScene};

use kiosk_common::events::{ConnectionState, DisplayMode, EventBus, KioskEvent, OverlaySnapshot};
use kiosk_common::time::now;
use kiosk_common::{AssetReference, ScreenIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::freshness::{AssetFreshnessPoller, FreshnessEvent, FreshnessProbe, TickOutcome};
use crate::overlay::{OverlayBoard, OverlayChannel, OverlayChannelConfig};
use crate::playback::{
    ChoreographyState, FrameCapture, MediaElement, MediaInspector, MediaMetadata,
    PlaybackChoreographer, PlaybackTimings, StillFrame,
};
use crate::resolver::AssetResolver;

/// Freshness events buffered between the poller and the loop
const FRESHNESS_CHANNEL_CAPACITY: usize = 16;

/// Commands buffered from the HTTP layer
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Prepared media buffered for the loop
const PREPARED_CHANNEL_CAPACITY: usize = 4;

/// Per-screen settings
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub screen: ScreenIdentity,
    pub display_mode: DisplayMode,
    pub poll_interval: Duration,
    pub playback: PlaybackTimings,
    /// `None` runs without a push channel
    pub channel: Option<OverlayChannelConfig>,
}

/// Pluggable collaborators
#[derive(Clone)]
pub struct RendererDeps {
    pub resolver: Arc<dyn AssetResolver>,
    pub probe: Arc<dyn FreshnessProbe>,
    pub inspector: Arc<dyn MediaInspector>,
    pub capture: Arc<dyn FrameCapture>,
    pub element: Arc<dyn MediaElement>,
}

/// Requests from outside the loop
#[derive(Debug)]
pub enum RendererCommand {
    /// Probe the watched asset now
    Refresh {
        reply: oneshot::Sender<Result<TickOutcome>>,
    },
}

/// Result of inspecting (and for videos, capturing) an asset off the loop
struct PreparedMedia {
    generation: u64,
    asset: AssetReference,
    result: Result<(MediaMetadata, Option<StillFrame>)>,
}

/// The one preparation allowed in flight
struct Preparation {
    generation: u64,
    task: JoinHandle<()>,
}

/// Cloneable handle for the HTTP layer
#[derive(Clone)]
pub struct RendererHandle {
    commands: mpsc::Sender<RendererCommand>,
    scene: SharedScene,
    board: OverlayBoard,
    bus: EventBus,
    cancel: CancellationToken,
}

impl RendererHandle {
    /// Trigger an immediate freshness probe
    ///
    /// Resolves to [`TickOutcome::Skipped`] if a probe is already in flight.
    pub async fn refresh(&self) -> Result<TickOutcome> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RendererCommand::Refresh { reply })
            .await
            .map_err(|_| Error::InvalidState("renderer is not running".to_string()))?;
        rx.await
            .map_err(|_| Error::InvalidState("renderer stopped before replying".to_string()))?
    }

    pub async fn scene(&self) -> SceneSnapshot {
        let scene = self.scene.read().await;
        scene.snapshot(self.board.snapshots())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Resolves once the renderer has been told to stop
    pub fn stopped(&self) -> WaitForCancellationFutureOwned {
        self.cancel.clone().cancelled_owned()
    }
}

/// The orchestrator for one screen
pub struct DisplayRenderer {
    settings: RendererSettings,
    deps: RendererDeps,
    bus: EventBus,
    scene: SharedScene,
    cancel: CancellationToken,

    poller: AssetFreshnessPoller,
    freshness_rx: mpsc::Receiver<FreshnessEvent>,
    board: OverlayBoard,
    overlay_rx: mpsc::UnboundedReceiver<OverlaySnapshot>,
    channel: Option<OverlayChannel>,
    choreographer: PlaybackChoreographer,
    commands: mpsc::Receiver<RendererCommand>,

    prepared_tx: mpsc::Sender<PreparedMedia>,
    prepared_rx: mpsc::Receiver<PreparedMedia>,
    /// Bumped for every show request
    show_generation: u64,
    preparing: Option<Preparation>,
}

impl DisplayRenderer {
    /// Build the renderer and its handle; nothing runs until [`DisplayRenderer::run`]
    pub fn new(
        settings: RendererSettings,
        deps: RendererDeps,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Result<(Self, RendererHandle)> {
        if settings.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }

        let (freshness_tx, freshness_rx) = mpsc::channel(FRESHNESS_CHANNEL_CAPACITY);
        let poller = AssetFreshnessPoller::new(Arc::clone(&deps.probe), freshness_tx, cancel.clone());

        let (overlay_tx, overlay_rx) = mpsc::unbounded_channel();
        let board = OverlayBoard::new(overlay_tx, cancel.child_token());

        let choreographer = PlaybackChoreographer::new(
            Arc::clone(&deps.element),
            settings.playback.clone(),
            bus.clone(),
            cancel.clone(),
        )?;

        let scene: SharedScene = Arc::new(RwLock::new(Scene::new(
            settings.screen.clone(),
            settings.display_mode,
        )));
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (prepared_tx, prepared_rx) = mpsc::channel(PREPARED_CHANNEL_CAPACITY);

        let handle = RendererHandle {
            commands: command_tx,
            scene: Arc::clone(&scene),
            board: board.clone(),
            bus: bus.clone(),
            cancel: cancel.clone(),
        };

        let renderer = Self {
            settings,
            deps,
            bus,
            scene,
            cancel,
            poller,
            freshness_rx,
            board,
            overlay_rx,
            channel: None,
            choreographer,
            commands,
            prepared_tx,
            prepared_rx,
            show_generation: 0,
            preparing: None,
        };
        Ok((renderer, handle))
    }

    /// Run until the cancellation token fires, then tear everything down
    pub async fn run(mut self) {
        info!(screen = %self.settings.screen, "Display renderer starting");

        if let Some(config) = self.settings.channel.clone() {
            self.channel = Some(OverlayChannel::spawn(
                config,
                self.settings.screen.clone(),
                self.board.clone(),
                self.bus.clone(),
                &self.cancel,
            ));
        }
        let mut connection_rx = self.channel.as_ref().map(OverlayChannel::subscribe_state);
        let mut playback_rx = self.choreographer.subscribe();

        self.initial_render().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                Some(event) = self.freshness_rx.recv() => {
                    self.on_freshness(event).await;
                }

                Some(snapshot) = self.overlay_rx.recv() => {
                    self.on_overlay(snapshot);
                }

                changed = connection_changed(&mut connection_rx) => {
                    match changed {
                        Some(state) => self.scene.write().await.connection = Some(state),
                        None => connection_rx = None,
                    }
                }

                Ok(()) = playback_rx.changed() => {
                    let state: ChoreographyState = playback_rx.borrow_and_update().clone();
                    self.scene.write().await.playback = state;
                }

                Some(prepared) = self.prepared_rx.recv() => {
                    self.on_prepared(prepared).await;
                }

                Some(command) = self.commands.recv() => {
                    self.on_command(command);
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        info!(screen = %self.settings.screen, "Display renderer shutting down");
        self.poller.stop();
        if let Some(preparation) = self.preparing.take() {
            preparation.task.abort();
        }
        if let Some(channel) = self.channel.as_mut() {
            channel.shutdown().await;
        }
        self.board.shutdown();
        self.choreographer.teardown().await;
    }

    /// Resolve, start watching and show whatever the screen should display
    async fn initial_render(&mut self) {
        let Some(asset) = self.resolve_and_watch().await else {
            return;
        };
        self.request_show(asset);
    }

    /// Resolve the screen's asset; (re)start the poller if the URL moved
    async fn resolve_and_watch(&mut self) -> Option<AssetReference> {
        let asset = match self.deps.resolver.resolve(&self.settings.screen).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(screen = %self.settings.screen, error = %e, "Asset resolution failed");
                return None;
            }
        };

        if self.poller.url() != Some(asset.url.as_str()) {
            self.poller.start(&asset.url, self.settings.poll_interval);
            self.scene.write().await.watched_url = Some(asset.url.clone());
        }
        Some(asset)
    }

    async fn on_freshness(&mut self, event: FreshnessEvent) {
        if self.poller.url() != Some(event.url()) {
            debug!(url = %event.url(), "Ignoring freshness event for a URL no longer watched");
            return;
        }

        match event {
            FreshnessEvent::Unchanged { url } => {
                // Nothing on screen yet (first inspection failed): try again
                if self.scene.read().await.media.is_none() && self.preparing.is_none() {
                    debug!(%url, "Retrying initial render");
                    if let Some(asset) = self.resolve_and_watch().await {
                        self.request_show(asset);
                    }
                }
            }
            FreshnessEvent::Changed { url, token } => {
                let Some(asset) = self.resolve_and_watch().await else {
                    return;
                };
                // The token only versions the URL it was read from
                let shown = if asset.url == url {
                    match asset.versioned(&token) {
                        Ok(versioned) => versioned,
                        Err(e) => {
                            warn!(error = %e, "Could not version asset URL");
                            asset
                        }
                    }
                } else {
                    info!(from = %url, to = %asset.url, "Asset URL moved");
                    asset
                };
                self.request_show(shown);
            }
            FreshnessEvent::ForcedRefresh { url } => {
                if self.scene.read().await.media.is_none() && self.preparing.is_none() {
                    info!(%url, "Metadata probes unsupported, forcing initial render");
                    if let Some(asset) = self.resolve_and_watch().await {
                        self.request_show(asset);
                    }
                }
            }
        }
    }

    /// Start preparing `asset` off the loop, superseding any preparation in flight
    fn request_show(&mut self, asset: AssetReference) {
        self.show_generation += 1;
        let generation = self.show_generation;

        if let Some(previous) = self.preparing.take() {
            debug!(generation = previous.generation, "Superseding media preparation");
            previous.task.abort();
        }

        let inspector = Arc::clone(&self.deps.inspector);
        let capture = Arc::clone(&self.deps.capture);
        let prepared_tx = self.prepared_tx.clone();
        let task = tokio::spawn(async move {
            let result = prepare(inspector.as_ref(), capture.as_ref(), &asset).await;
            let _ = prepared_tx
                .send(PreparedMedia {
                    generation,
                    asset,
                    result,
                })
                .await;
        });
        self.preparing = Some(Preparation { generation, task });
    }

    /// Swap in prepared media; a failed inspection keeps the previous asset up
    async fn on_prepared(&mut self, prepared: PreparedMedia) {
        let PreparedMedia {
            generation,
            asset,
            result,
        } = prepared;

        if generation != self.show_generation {
            debug!(url = %asset.url, generation, "Dropping superseded media preparation");
            return;
        }
        self.preparing = None;

        let (metadata, still) = match result {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(url = %asset.url, error = %e, "New asset failed inspection, keeping current one");
                self.retain(&asset, e.to_string()).await;
                return;
            }
        };

        // The old choreography must be gone before the scene shows the new asset
        self.choreographer.teardown().await;

        {
            let mut scene = self.scene.write().await;
            scene.media = Some(MediaLayer {
                asset: asset.clone(),
                metadata,
                shown_at: now(),
            });
            scene.still = still.clone();
            scene.last_failure = None;
        }

        info!(url = %asset.url, kind = ?asset.kind, "Media swapped");
        self.bus.emit_lossy(KioskEvent::MediaChanged {
            asset: asset.clone(),
            display_mode: self.settings.display_mode,
            timestamp: now(),
        });
        if let Some(still) = &still {
            self.bus.emit_lossy(KioskEvent::StillCaptured {
                data_uri: still.data_uri.clone(),
                timestamp: now(),
            });
        }

        if asset.is_video() {
            if let Err(e) = self
                .choreographer
                .start(asset.clone(), metadata, still.is_some())
                .await
            {
                warn!(url = %asset.url, error = %e, "Choreography failed to start");
            }
        }
    }

    async fn retain(&self, attempted: &AssetReference, reason: String) {
        self.scene.write().await.last_failure = Some(RetainedFailure {
            attempted_url: attempted.url.clone(),
            reason: reason.clone(),
            at: now(),
        });
        self.bus.emit_lossy(KioskEvent::MediaRetained {
            attempted_url: attempted.url.clone(),
            reason,
            timestamp: now(),
        });
    }

    fn on_overlay(&self, snapshot: OverlaySnapshot) {
        self.bus.emit_lossy(KioskEvent::OverlayChanged {
            overlay: snapshot,
            timestamp: now(),
        });
    }

    fn on_command(&self, command: RendererCommand) {
        match command {
            RendererCommand::Refresh { reply } => {
                let Some(handle) = self.poller.handle() else {
                    let _ = reply.send(Err(Error::InvalidState(
                        "no asset is being watched".to_string(),
                    )));
                    return;
                };
                // Runs beside the loop so the resulting event can be consumed
                tokio::spawn(async move {
                    let outcome = handle.check_now().await;
                    debug!(url = %handle.url(), ?outcome, "Manual refresh");
                    let _ = reply.send(Ok(outcome));
                });
            }
        }
    }
}

/// Inspect `asset` and capture a still for videos
///
/// A failed capture is not fatal: the video loops without a cover.
async fn prepare(
    inspector: &dyn MediaInspector,
    capture: &dyn FrameCapture,
    asset: &AssetReference,
) -> Result<(MediaMetadata, Option<StillFrame>)> {
    let metadata = inspector.inspect(asset).await?;
    if !asset.is_video() {
        return Ok((metadata, None));
    }

    let still = match capture.capture_first_frame(asset).await {
        Ok(still) => Some(still),
        Err(e) => {
            warn!(url = %asset.url, error = %e, "First-frame capture failed, looping without cover");
            None
        }
    };
    Ok((metadata, still))
}

/// Next connection state, or `None` once the channel is gone; pends forever without one
async fn connection_changed(
    rx: &mut Option<watch::Receiver<ConnectionState>>,
) -> Option<ConnectionState> {
    match rx.as_mut() {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
