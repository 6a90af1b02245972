//! Media element, inspection and still-capture seams
//!
//! The choreographer only ever talks to a [`MediaElement`]; what actually renders the
//! frames (a browser mirroring commands, a native player) sits behind the trait.

use async_trait::async_trait;
use kiosk_common::AssetReference;
use serde::Serialize;

use crate::error::Result;

/// What inspection learned about an asset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MediaMetadata {
    /// Native duration in seconds; zero for stills
    pub duration_secs: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// First decodable frame of a video, ready to render as an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StillFrame {
    /// `data:image/png;base64,…`
    pub data_uri: String,
}

/// A seekable, rate-controllable video handle
///
/// `seek` resolves only once the target frame has been committed, so a caller that
/// awaits it may assume the new position is what is on screen.
#[async_trait]
pub trait MediaElement: Send + Sync {
    async fn load(&self, asset: &AssetReference, metadata: &MediaMetadata) -> Result<()>;

    async fn seek(&self, position_secs: f64) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Callers clamp `rate` first; implementations may assume it is in range
    async fn set_playback_rate(&self, rate: f64) -> Result<()>;

    /// Current position in native seconds
    fn current_time(&self) -> f64;

    fn duration(&self) -> Option<f64>;
}

/// Checks that an asset is decodable and reads its duration
#[async_trait]
pub trait MediaInspector: Send + Sync {
    async fn inspect(&self, asset: &AssetReference) -> Result<MediaMetadata>;
}

/// Captures the first frame of a video
#[async_trait]
pub trait FrameCapture: Send + Sync {
    async fn capture_first_frame(&self, asset: &AssetReference) -> Result<StillFrame>;
}
