//! Asset freshness polling
//!
//! Detects when the asset behind a screen has changed using metadata-only probes
//! (HTTP HEAD) instead of re-downloading content.
//!
//! - [`FreshnessState`]: token bookkeeping with cold-start suppression
//! - [`AssetFreshnessPoller`]: self-paced polling loop, one probe in flight at most
//! - [`HttpHeadProbe`]: the production probe

mod poller;
mod probe;
mod state;

pub use poller::{AssetFreshnessPoller, PollHandle, TickOutcome};
pub use probe::{FreshnessProbe, HttpHeadProbe};
pub use state::{FreshnessEvent, FreshnessState};
