//! # Kiosk Display Renderer (kiosk-display)
//!
//! Shows the freshest media asset for one named screen, layers short-lived overlays
//! pushed from a server on top, and loops videos with variable-speed playback and a
//! still-frame crossfade at the seam.
//!
//! **Architecture:** three independent components wired by [`renderer::DisplayRenderer`]:
//! - [`freshness`]: HEAD-probe polling with cold-start suppression
//! - [`overlay`]: reconnecting WebSocket channel and overlay lifecycles
//! - [`playback`]: the loop choreography
//!
//! Nothing here is fatal at runtime. Failures are logged and the last good frame stays up.

pub mod api;
pub mod config;
pub mod error;
pub mod freshness;
pub mod overlay;
pub mod playback;
pub mod renderer;
pub mod resolver;

pub use error::{Error, Result};
