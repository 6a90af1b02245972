//! # Kiosk Common Library
//!
//! Shared code for the kiosk display workspace:
//! - Screen identities and asset references
//! - Event types (KioskEvent enum) and the event bus
//! - Easing curves for rate ramps and fades
//! - Configuration file discovery
//! - Time helpers

pub mod asset;
pub mod config;
pub mod ease;
pub mod error;
pub mod events;
pub mod time;

pub use asset::{AssetKind, AssetReference, ScreenIdentity};
pub use ease::EaseCurve;
pub use error::{Error, Result};
