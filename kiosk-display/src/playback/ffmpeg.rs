//! ffprobe inspection and ffmpeg first-frame capture
//!
//! Both tools must be installed; their paths come from the `[tools]` config section.
//! Each invocation is bounded by a timeout and killed if it overruns.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kiosk_common::AssetReference;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::media::{FrameCapture, MediaInspector, MediaMetadata, StillFrame};
use crate::error::{Error, Result};

/// Paths and limits for the external media tools
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout: Duration,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

impl FfmpegTools {
    async fn run(&self, command: &mut Command, tool: &str) -> Result<Output> {
        command.kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Media(format!("{} timed out after {:?}", tool, self.timeout)))?
            .map_err(|e| Error::Media(format!("failed to run {}: {}", tool, e)))?;
        Ok(output)
    }
}

/// Turn ffprobe's JSON into metadata; videos must report a positive duration
fn parse_probe(stdout: &[u8], asset: &AssetReference) -> Result<MediaMetadata> {
    let parsed: ProbeOut = serde_json::from_slice(stdout)
        .map_err(|e| Error::Media(format!("ffprobe json parse failed: {}", e)))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::Media(format!("no decodable picture in '{}'", asset.url)))?;

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    if asset.is_video() && duration_secs <= 0.0 {
        return Err(Error::Media(format!("video '{}' reports no duration", asset.url)));
    }

    Ok(MediaMetadata {
        duration_secs,
        width: stream.width,
        height: stream.height,
    })
}

fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[async_trait]
impl MediaInspector for FfmpegTools {
    async fn inspect(&self, asset: &AssetReference) -> Result<MediaMetadata> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(&asset.url);

        let output = self.run(&mut command, "ffprobe").await?;
        if !output.status.success() {
            return Err(Error::Media(format!(
                "ffprobe failed for '{}': {}",
                asset.url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let metadata = parse_probe(&output.stdout, asset)?;
        debug!(url = %asset.url, duration_secs = metadata.duration_secs, "Asset inspected");
        Ok(metadata)
    }
}

#[async_trait]
impl FrameCapture for FfmpegTools {
    async fn capture_first_frame(&self, asset: &AssetReference) -> Result<StillFrame> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-v", "error", "-i"])
            .arg(&asset.url)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"]);

        let output = self
            .run(&mut command, "ffmpeg")
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Capture(format!(
                "ffmpeg frame capture failed for '{}': {}",
                asset.url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(Error::Capture(format!("ffmpeg returned no frame for '{}'", asset.url)));
        }

        debug!(url = %asset.url, bytes = output.stdout.len(), "First frame captured");
        Ok(StillFrame {
            data_uri: png_data_uri(&output.stdout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(url: &str) -> AssetReference {
        AssetReference::parse(url).unwrap()
    }

    #[test]
    fn test_parse_probe_video() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1920, "height": 1080}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let metadata = parse_probe(json, &asset("http://media.local/loop.mp4")).unwrap();
        assert_eq!(metadata.duration_secs, 12.48);
        assert_eq!(metadata.width, Some(1920));
    }

    #[test]
    fn test_parse_probe_still_image() {
        let json = br#"{"streams":[{"codec_type":"video","width":800,"height":600}],"format":{}}"#;
        let metadata = parse_probe(json, &asset("http://media.local/poster.png")).unwrap();
        assert_eq!(metadata.duration_secs, 0.0);
    }

    #[test]
    fn test_video_without_duration_rejected() {
        let json = br#"{"streams":[{"codec_type":"video"}],"format":{"duration":"N/A"}}"#;
        assert!(parse_probe(json, &asset("http://media.local/broken.mp4")).is_err());
    }

    #[test]
    fn test_no_picture_rejected() {
        let json = br#"{"streams":[{"codec_type":"audio"}]}"#;
        assert!(parse_probe(json, &asset("http://media.local/a.png")).is_err());
        assert!(parse_probe(b"garbage", &asset("http://media.local/a.png")).is_err());
    }

    #[test]
    fn test_png_data_uri() {
        assert_eq!(png_data_uri(&[0x89, b'P', b'N', b'G']), "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_missing_tool_is_media_error() {
        let tools = FfmpegTools {
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
            ..Default::default()
        };
        let err = tools.inspect(&asset("http://media.local/a.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Media(_)));
    }
}
