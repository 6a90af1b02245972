//! Freshness token bookkeeping

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ProbeError;

/// Outcome of comparing a probe result against the stored token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshnessEvent {
    /// Token matches the previously observed one
    Unchanged { url: String },

    /// Token differs from a previously observed non-null token
    Changed { url: String, token: String },

    /// Metadata probes are unsupported and nothing was ever observed: render once anyway
    ForcedRefresh { url: String },
}

impl FreshnessEvent {
    pub fn url(&self) -> &str {
        match self {
            FreshnessEvent::Unchanged { url }
            | FreshnessEvent::Changed { url, .. }
            | FreshnessEvent::ForcedRefresh { url } => url,
        }
    }
}

/// Per-asset freshness state
///
/// Tokens are opaque validators compared for strict inequality; they are never parsed
/// as dates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreshnessState {
    pub last_modified_token: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub is_check_in_flight: bool,
    /// The unsupported-probe fallback fires at most once per poller start
    pub forced_refresh_used: bool,
}

impl FreshnessState {
    /// Record a successful probe
    ///
    /// The first token after (re)start only primes the state.
    pub fn observe(&mut self, url: &str, token: String) -> Option<FreshnessEvent> {
        self.last_checked_at = Some(Utc::now());

        match self.last_modified_token.as_deref() {
            None => {
                self.last_modified_token = Some(token);
                None
            }
            Some(previous) if previous == token => Some(FreshnessEvent::Unchanged {
                url: url.to_string(),
            }),
            Some(_) => {
                self.last_modified_token = Some(token.clone());
                Some(FreshnessEvent::Changed {
                    url: url.to_string(),
                    token,
                })
            }
        }
    }

    /// Record a failed probe
    ///
    /// Failures never report a change. The only exception is the one-time fallback for
    /// servers that cannot answer metadata probes at all.
    pub fn observe_failure(&mut self, url: &str, error: &ProbeError) -> Option<FreshnessEvent> {
        self.last_checked_at = Some(Utc::now());

        let unsupported = matches!(error, ProbeError::Unsupported(_));
        if unsupported && self.last_modified_token.is_none() && !self.forced_refresh_used {
            self.forced_refresh_used = true;
            return Some(FreshnessEvent::ForcedRefresh {
                url: url.to_string(),
            });
        }
        None
    }
}
