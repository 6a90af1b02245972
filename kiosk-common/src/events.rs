//! Event types for the kiosk event system
//!
//! # Architecture
//!
//! The renderer uses the same hybrid communication model throughout:
//! - **EventBus** (tokio::broadcast): one-to-many fan-out of [`KioskEvent`] to SSE clients
//! - **Command channels** (tokio::mpsc): component → orchestrator messages
//! - **Watch channels**: latest-value state (connection state, playback cycle)
//!
//! Components never signal each other through shared globals; every cross-component
//! notification travels through one of these channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::asset::{AssetKind, AssetReference};

/// Kiosk event types, streamed to front-ends over SSE
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KioskEvent {
    /// A new asset replaced the media layer
    MediaChanged {
        asset: AssetReference,
        display_mode: DisplayMode,
        timestamp: DateTime<Utc>,
    },

    /// A new asset failed inspection; the previous asset stays on screen
    MediaRetained {
        attempted_url: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Low-level command for the media element mirrored by the front-end
    MediaCommand {
        command: MediaCommand,
        timestamp: DateTime<Utc>,
    },

    /// Choreography entered a new phase
    PlaybackPhaseChanged {
        phase: PlaybackPhase,
        rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// First-frame still captured for the current video (data URI)
    StillCaptured {
        data_uri: String,
        timestamp: DateTime<Utc>,
    },

    /// Still-frame cover opacity target with its transition length
    StillCoverChanged {
        opacity: f64,
        transition_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Overlay entered a new lifecycle phase
    OverlayChanged {
        overlay: OverlaySnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Push-channel connection state changed
    ConnectionStateChanged {
        state: ConnectionState,
        timestamp: DateTime<Utc>,
    },
}

impl KioskEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            KioskEvent::MediaChanged { .. } => "MediaChanged",
            KioskEvent::MediaRetained { .. } => "MediaRetained",
            KioskEvent::MediaCommand { .. } => "MediaCommand",
            KioskEvent::PlaybackPhaseChanged { .. } => "PlaybackPhaseChanged",
            KioskEvent::StillCaptured { .. } => "StillCaptured",
            KioskEvent::StillCoverChanged { .. } => "StillCoverChanged",
            KioskEvent::OverlayChanged { .. } => "OverlayChanged",
            KioskEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
        }
    }
}

/// How media fills the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Letterbox, whole asset visible
    #[default]
    Contain,
    /// Fill the viewport, cropping as needed
    Cover,
}

impl DisplayMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contain" => Some(DisplayMode::Contain),
            "cover" => Some(DisplayMode::Cover),
            _ => None,
        }
    }
}

/// Commands applied to the media element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MediaCommand {
    Load { url: String, kind: AssetKind },
    Play,
    Pause,
    Seek { position_secs: f64 },
    SetRate { rate: f64 },
}

/// Overlay lifecycle phase
///
/// Phases only move forward. `clear` is the single exception: it sends any live
/// overlay straight to `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverlayPhase {
    Created,
    FadingIn,
    Visible,
    FadingOut,
    Removed,
}

impl OverlayPhase {
    /// Whether moving from `self` to `next` respects forward-only ordering
    pub fn can_advance_to(self, next: OverlayPhase) -> bool {
        next > self
    }

    pub fn is_live(self) -> bool {
        self != OverlayPhase::Removed
    }
}

/// Playback choreography phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackPhase {
    Primer,
    EasingIn,
    Hold,
    EasingOut,
    PausedOnFinalFrame,
    Crossfading,
    HoldingStill,
}

/// One of nine named overlay placements; `None` on a record means fullscreen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionSlot {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl PositionSlot {
    /// Parse a slot name, accepting kebab, snake and camel spellings
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "topleft" => Some(PositionSlot::TopLeft),
            "topcenter" | "top" => Some(PositionSlot::TopCenter),
            "topright" => Some(PositionSlot::TopRight),
            "middleleft" | "centerleft" | "left" => Some(PositionSlot::MiddleLeft),
            "center" | "middle" | "middlecenter" => Some(PositionSlot::Center),
            "middleright" | "centerright" | "right" => Some(PositionSlot::MiddleRight),
            "bottomleft" => Some(PositionSlot::BottomLeft),
            "bottomcenter" | "bottom" => Some(PositionSlot::BottomCenter),
            "bottomright" => Some(PositionSlot::BottomRight),
            _ => None,
        }
    }
}

/// Point-in-time view of an overlay, as the front-end needs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    pub id: Uuid,
    pub html: String,
    pub position: Option<PositionSlot>,
    pub phase: OverlayPhase,
    /// Opacity the layer should transition towards
    pub target_opacity: f64,
    /// Length of the transition towards `target_opacity`
    pub transition_ms: u64,
    /// Arrival order; later overlays stack on top
    pub sequence: u64,
}

/// Push-channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connection ended; `clean` is false for errors
    Closed { clean: bool },
    /// Waiting before reconnect attempt `attempt`
    Backoff { attempt: u32, delay_ms: u64 },
}

/// Event distribution bus
///
/// Thin wrapper over a `broadcast` channel. Slow subscribers lag and lose the oldest
/// events rather than blocking producers.
///
/// # Examples
///
/// ```
/// use kiosk_common::events::EventBus;
///
/// let event_bus = EventBus::new(256);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KioskEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KioskEvent,
    ) -> Result<usize, broadcast::error::SendError<KioskEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KioskEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
