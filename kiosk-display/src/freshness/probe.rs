//! Metadata-only freshness probes

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CACHE_CONTROL, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::trace;

use crate::error::{ProbeError, Result};

/// Fetches the current freshness token for an asset URL without downloading the body
#[async_trait]
pub trait FreshnessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> std::result::Result<String, ProbeError>;
}

/// HEAD-request probe reading `Last-Modified` (or `ETag` when absent)
#[derive(Clone)]
pub struct HttpHeadProbe {
    client: reqwest::Client,
}

impl HttpHeadProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kiosk-display/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FreshnessProbe for HttpHeadProbe {
    async fn probe(&self, url: &str) -> std::result::Result<String, ProbeError> {
        let response = self
            .client
            .head(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout
                } else {
                    ProbeError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        trace!(%url, %status, "HEAD probe response");

        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            return Err(ProbeError::Unsupported(format!("HEAD answered {}", status)));
        }
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        validator_token(response.headers()).ok_or_else(|| {
            ProbeError::Unsupported("response carries no Last-Modified or ETag".to_string())
        })
    }
}

/// Pick the freshness validator from response headers
fn validator_token(headers: &HeaderMap) -> Option<String> {
    [LAST_MODIFIED, ETAG]
        .iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
