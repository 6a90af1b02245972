//! Inbound overlay directives
//!
//! Wire shape: `{ html, duration?, position?, clear?, screens?, fadeinMs? }`.
//! Durations are milliseconds and may arrive as JSON floats.

use kiosk_common::events::PositionSlot;
use kiosk_common::ScreenIdentity;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayDirective {
    #[serde(default)]
    pub html: String,

    /// Visible duration in milliseconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Named slot; absent means fullscreen
    #[serde(default)]
    pub position: Option<String>,

    /// Remove every live overlay before handling this one
    #[serde(default)]
    pub clear: bool,

    /// Screens this directive is addressed to; absent or empty means all
    #[serde(default)]
    pub screens: Option<Vec<String>>,

    /// Fade-in length in milliseconds; `0` snaps straight to visible
    #[serde(default, alias = "fadeInMs", alias = "fadein_ms")]
    pub fadein_ms: Option<f64>,
}

impl OverlayDirective {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether this directive targets `screen`
    pub fn is_addressed_to(&self, screen: &ScreenIdentity) -> bool {
        match &self.screens {
            Some(screens) if !screens.is_empty() => {
                screens.iter().any(|s| s == screen.as_str())
            }
            _ => true,
        }
    }

    /// Resolved placement; unknown slot names fall back to fullscreen
    pub fn position_slot(&self) -> Option<PositionSlot> {
        let name = self.position.as_deref()?.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("fullscreen") {
            return None;
        }
        let slot = PositionSlot::from_str(name);
        if slot.is_none() {
            warn!(position = %name, "Unknown overlay position, rendering fullscreen");
        }
        slot
    }

    pub fn has_content(&self) -> bool {
        !self.html.trim().is_empty()
    }
}

/// Convert a wire millisecond value, keeping an explicit `0` literally
pub(crate) fn millis_or(value: Option<f64>, default: u64) -> u64 {
    match value {
        Some(ms) if ms.is_finite() => ms.max(0.0).round() as u64,
        _ => default,
    }
}
