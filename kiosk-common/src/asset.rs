//! Screen identities and asset references
//!
//! A renderer is bound to one [`ScreenIdentity`] for its whole lifetime. The media it shows is
//! described by an [`AssetReference`], which is replaced wholesale whenever the asset changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::{Error, Result};

/// Extensions rendered through the video path. Everything else is treated as a still image.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v", "mkv", "ogv"];

/// Query parameter used to defeat caches when an asset changes behind a stable URL
pub const VERSION_PARAM: &str = "v";

/// Opaque key identifying a display target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenIdentity(String);

impl ScreenIdentity {
    /// Create a screen identity, rejecting empty or whitespace-only names
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("screen identity must not be empty".to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of media behind an asset URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Infer the kind from the extension of the URL path (query and fragment ignored)
    pub fn from_url(url: &Url) -> Self {
        let extension = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => AssetKind::Video,
            _ => AssetKind::Image,
        }
    }
}

/// Immutable description of the media shown on a screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    pub url: String,
    pub kind: AssetKind,
}

impl AssetReference {
    /// Parse a URL and derive its kind
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("invalid asset URL '{}': {}", url, e)))?;
        Ok(Self {
            kind: AssetKind::from_url(&parsed),
            url: parsed.into(),
        })
    }

    pub fn is_video(&self) -> bool {
        self.kind == AssetKind::Video
    }

    /// Return a new reference whose URL carries `v=<token>`
    ///
    /// Any previous version parameter is replaced; the kind is unchanged since the path is.
    pub fn versioned(&self, token: &str) -> Result<Self> {
        let mut parsed = Url::parse(&self.url)
            .map_err(|e| Error::InvalidInput(format!("invalid asset URL '{}': {}", self.url, e)))?;

        let retained: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| key != VERSION_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = parsed.query_pairs_mut();
            pairs.clear();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(VERSION_PARAM, token);
        }

        Ok(Self {
            url: parsed.into(),
            kind: self.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_identity_rejects_blank() {
        assert!(ScreenIdentity::new("").is_err());
        assert!(ScreenIdentity::new("   ").is_err());
        assert_eq!(ScreenIdentity::new("lobby").unwrap().as_str(), "lobby");
    }

    #[test]
    fn test_kind_from_extension() {
        let video = AssetReference::parse("http://media.local/screens/a/latest.MP4").unwrap();
        assert_eq!(video.kind, AssetKind::Video);

        let image = AssetReference::parse("http://media.local/screens/a/latest.png").unwrap();
        assert_eq!(image.kind, AssetKind::Image);

        let bare = AssetReference::parse("http://media.local/screens/a/latest").unwrap();
        assert_eq!(bare.kind, AssetKind::Image);
    }

    #[test]
    fn test_kind_ignores_query_string() {
        let asset = AssetReference::parse("http://media.local/clip.webm?x=photo.png").unwrap();
        assert_eq!(asset.kind, AssetKind::Video);
    }

    #[test]
    fn test_versioned_replaces_previous_token() {
        let asset = AssetReference::parse("http://media.local/clip.mp4?screen=a").unwrap();
        let first = asset.versioned("Tue, 01 Oct 2024 10:00:00 GMT").unwrap();
        let second = first.versioned("T2").unwrap();

        assert!(second.url.contains("screen=a"));
        assert!(second.url.ends_with("v=T2"));
        assert_eq!(second.url.matches("v=").count(), 1);
        assert_eq!(second.kind, AssetKind::Video);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AssetReference::parse("not a url").is_err());
    }
}
