//! Overlay push channel
//!
//! Maintains one reconnecting WebSocket per screen process and turns inbound JSON
//! directives into overlay records with independent fade lifecycles.
//!
//! # Components
//!
//! - [`OverlayDirective`]: wire format, targeting and clear semantics
//! - [`OverlayRecord`] / [`OverlayBoard`]: live overlays and their phase timers
//! - [`ReconnectBackoff`]: `min(10s, 1s × 2^attempt)` delay schedule
//! - [`OverlayChannel`]: the connection state machine driving all of the above
//!
//! Directives that arrive while disconnected are lost; overlays are ephemeral and no
//! replay is attempted.

mod backoff;
mod board;
mod channel;
mod directive;
mod record;

pub use backoff::{ReconnectBackoff, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP};
pub use board::{DirectiveOutcome, OverlayBoard};
pub use channel::{OverlayChannel, OverlayChannelConfig};
pub use directive::OverlayDirective;
pub use record::{
    OverlayRecord, COMMIT_TICK_MS, DEFAULT_FADE_IN_MS, DEFAULT_VISIBLE_DURATION_MS,
    OVERLAY_FADE_OUT_MS,
};
