//! Screen → asset resolution

use async_trait::async_trait;
use kiosk_common::{AssetReference, ScreenIdentity};

use crate::error::{Error, Result};

/// Placeholder replaced with the screen identity
pub const SCREEN_PLACEHOLDER: &str = "{screen}";

/// Decides which asset a screen should show
#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve(&self, screen: &ScreenIdentity) -> Result<AssetReference>;
}

/// Resolves by substituting the screen into a URL template
///
/// `http://media.local/screens/{screen}/latest.mp4` for screen `lobby` resolves to
/// `http://media.local/screens/lobby/latest.mp4`. A template without the placeholder
/// serves the same asset to every screen.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    template: String,
}

impl TemplateResolver {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(Error::Config("asset URL template is empty".to_string()));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[async_trait]
impl AssetResolver for TemplateResolver {
    async fn resolve(&self, screen: &ScreenIdentity) -> Result<AssetReference> {
        let url = self.template.replace(SCREEN_PLACEHOLDER, screen.as_str());
        Ok(AssetReference::parse(&url)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_common::AssetKind;

    fn screen(name: &str) -> ScreenIdentity {
        ScreenIdentity::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_substitutes_screen() {
        let resolver = TemplateResolver::new("http://media.local/screens/{screen}/latest.mp4").unwrap();
        let asset = resolver.resolve(&screen("lobby")).await.unwrap();
        assert_eq!(asset.url, "http://media.local/screens/lobby/latest.mp4");
        assert_eq!(asset.kind, AssetKind::Video);
    }

    #[tokio::test]
    async fn test_template_without_placeholder() {
        let resolver = TemplateResolver::new("http://media.local/poster.jpg").unwrap();
        let a = resolver.resolve(&screen("A")).await.unwrap();
        let b = resolver.resolve(&screen("B")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, AssetKind::Image);
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        let resolver = TemplateResolver::new("not a url {screen}").unwrap();
        assert!(resolver.resolve(&screen("A")).await.is_err());
        assert!(TemplateResolver::new("  ").is_err());
    }
}
