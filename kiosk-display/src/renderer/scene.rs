//! What is on screen right now
//!
//! The orchestrator is the only writer; the HTTP layer reads snapshots. Overlays are
//! not stored here: the board owns them and they are read at snapshot time.

use chrono::{DateTime, Utc};
use kiosk_common::events::{ConnectionState, DisplayMode, OverlaySnapshot};
use kiosk_common::{AssetReference, ScreenIdentity};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::playback::{ChoreographyState, MediaMetadata, PlaybackCycle, StillCover, StillFrame};

/// The media currently rendered
#[derive(Debug, Clone, Serialize)]
pub struct MediaLayer {
    pub asset: AssetReference,
    pub metadata: MediaMetadata,
    pub shown_at: DateTime<Utc>,
}

/// A new asset that was rejected while the previous one stayed up
#[derive(Debug, Clone, Serialize)]
pub struct RetainedFailure {
    pub attempted_url: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Mutable scene state
#[derive(Debug)]
pub struct Scene {
    pub screen: ScreenIdentity,
    pub display_mode: DisplayMode,
    pub watched_url: Option<String>,
    pub media: Option<MediaLayer>,
    pub still: Option<StillFrame>,
    pub playback: ChoreographyState,
    pub connection: Option<ConnectionState>,
    pub last_failure: Option<RetainedFailure>,
}

impl Scene {
    pub fn new(screen: ScreenIdentity, display_mode: DisplayMode) -> Self {
        Self {
            screen,
            display_mode,
            watched_url: None,
            media: None,
            still: None,
            playback: ChoreographyState::default(),
            connection: None,
            last_failure: None,
        }
    }

    /// Combine the scene with the live `overlays`, given in stacking order
    pub fn snapshot(&self, overlays: Vec<OverlaySnapshot>) -> SceneSnapshot {
        SceneSnapshot {
            screen: self.screen.clone(),
            display_mode: self.display_mode,
            watched_url: self.watched_url.clone(),
            media: self.media.clone(),
            still: self.still.clone(),
            cover: self.playback.cover,
            playback: self.playback.cycle.clone(),
            overlays,
            connection: self.connection,
            last_failure: self.last_failure.clone(),
        }
    }
}

/// Serializable view served by `GET /api/v1/scene`
#[derive(Debug, Clone, Serialize)]
pub struct SceneSnapshot {
    pub screen: ScreenIdentity,
    pub display_mode: DisplayMode,
    pub watched_url: Option<String>,
    pub media: Option<MediaLayer>,
    pub still: Option<StillFrame>,
    pub cover: StillCover,
    pub playback: Option<PlaybackCycle>,
    /// Stacking order: earliest first, later overlays on top
    pub overlays: Vec<OverlaySnapshot>,
    /// `None` when no push channel is configured
    pub connection: Option<ConnectionState>,
    pub last_failure: Option<RetainedFailure>,
}

pub type SharedScene = Arc<RwLock<Scene>>;
