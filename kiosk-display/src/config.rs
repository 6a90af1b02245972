//! kiosk-display configuration
//!
//! Sources, highest priority first:
//! 1. Command-line arguments
//! 2. `KIOSK_*` environment variables (read by clap)
//! 3. TOML file (`--config`, `KIOSK_CONFIG`, user config dir, `/etc/kiosk/config.toml`)
//! 4. Built-in defaults
//!
//! A missing file is not an error; a malformed one is.

use clap::Parser;
use kiosk_common::config::{load_or_default, resolve_config_path, CONFIG_ENV_VAR};
use kiosk_common::events::DisplayMode;
use kiosk_common::ScreenIdentity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::overlay::OverlayChannelConfig;
use crate::playback::{FfmpegTools, PlaybackTimings};
use crate::renderer::RendererSettings;
use crate::resolver::TemplateResolver;

/// Command-line arguments for kiosk-display
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "kiosk-display")]
#[command(about = "Unattended kiosk display renderer")]
#[command(version)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Screen identity this renderer serves
    #[arg(short, long, env = "KIOSK_SCREEN")]
    pub screen: Option<String>,

    /// Asset URL template; `{screen}` is replaced with the screen identity
    #[arg(long, env = "KIOSK_ASSET_URL")]
    pub asset_url: Option<String>,

    /// WebSocket URL of the overlay push channel
    #[arg(long, env = "KIOSK_PUSH_URL")]
    pub push_url: Option<String>,

    /// Port for the HTTP API
    #[arg(short, long, env = "KIOSK_PORT")]
    pub port: Option<u16>,

    /// Seconds between freshness probes
    #[arg(long, env = "KIOSK_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KIOSK_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// External tool paths (`[tools]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout_secs: 30,
        }
    }
}

/// Logging configuration (`[logging]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub screen: String,
    pub asset_url: String,
    pub poll_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub push_url: Option<String>,
    pub display_mode: DisplayMode,
    pub port: u16,
    pub playback: PlaybackTimings,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            screen: String::new(),
            asset_url: String::new(),
            poll_interval_secs: 10,
            probe_timeout_secs: 10,
            push_url: None,
            display_mode: DisplayMode::Contain,
            port: 5780,
            playback: PlaybackTimings::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DisplayConfig {
    /// Load file config (if any), apply CLI/env overrides and validate
    pub fn load(args: &Args) -> Result<Self> {
        let path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
        let mut config: DisplayConfig = load_or_default(path.as_deref())?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(screen) = &args.screen {
            self.screen = screen.clone();
        }
        if let Some(asset_url) = &args.asset_url {
            self.asset_url = asset_url.clone();
        }
        if let Some(push_url) = &args.push_url {
            self.push_url = Some(push_url.clone());
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(secs) = args.poll_interval {
            self.poll_interval_secs = secs;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.screen.trim().is_empty() {
            return Err(Error::Config("screen identity is required".to_string()));
        }
        if self.asset_url.trim().is_empty() {
            return Err(Error::Config("asset_url is required".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.probe_timeout_secs == 0 {
            return Err(Error::Config("probe_timeout_secs must be positive".to_string()));
        }
        if let Some(push_url) = &self.push_url {
            let scheme = url::Url::parse(push_url)
                .map_err(|e| Error::Config(format!("invalid push_url '{}': {}", push_url, e)))?
                .scheme()
                .to_string();
            if scheme != "ws" && scheme != "wss" {
                return Err(Error::Config(format!(
                    "push_url must use ws:// or wss://, got '{}'",
                    push_url
                )));
            }
        }
        self.playback.validate().map_err(Error::Config)?;
        Ok(())
    }

    pub fn screen_identity(&self) -> Result<ScreenIdentity> {
        Ok(ScreenIdentity::new(self.screen.as_str())?)
    }

    pub fn resolver(&self) -> Result<TemplateResolver> {
        TemplateResolver::new(self.asset_url.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ffmpeg_tools(&self) -> FfmpegTools {
        FfmpegTools {
            ffmpeg: self.tools.ffmpeg.clone(),
            ffprobe: self.tools.ffprobe.clone(),
            timeout: Duration::from_secs(self.tools.timeout_secs),
        }
    }

    pub fn renderer_settings(&self) -> Result<RendererSettings> {
        Ok(RendererSettings {
            screen: self.screen_identity()?,
            display_mode: self.display_mode,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            playback: self.playback.clone(),
            channel: self.push_url.clone().map(OverlayChannelConfig::new),
        })
    }
}
