//! Looped video choreography
//!
//! - [`PlaybackChoreographer`]: drives one media element through the seamless loop
//! - [`RemoteMediaElement`]: in-process clock whose commands front-ends mirror
//! - [`FfmpegTools`]: ffprobe inspection and first-frame capture
//! - [`clamp_rate`]: every rate passes through here before reaching an element

pub mod choreographer;
pub mod clock_element;
pub mod ffmpeg;
pub mod media;
pub mod rate;
pub mod timings;

pub use choreographer::{
    ChoreographyState, PlaybackChoreographer, PlaybackCycle, StillCover, FRAME_INTERVAL,
};
pub use clock_element::RemoteMediaElement;
pub use ffmpeg::FfmpegTools;
pub use media::{FrameCapture, MediaElement, MediaInspector, MediaMetadata, StillFrame};
pub use rate::{clamp_rate, MAX_RATE, MIN_RATE, PRIMER_RATE};
pub use timings::PlaybackTimings;
