//! Shared fakes for kiosk-display integration tests
//!
//! - [`ScriptedProbe`]: freshness tokens served from a script
//! - [`FakeInspector`] / [`FakeCapture`]: media seams without ffmpeg
//! - [`TestRenderer`]: a running renderer wired to the fakes

#![allow(dead_code)]

use async_trait::async_trait;
use kiosk_common::events::{DisplayMode, EventBus, KioskEvent};
use kiosk_common::{AssetReference, ScreenIdentity};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kiosk_display::error::{Error, ProbeError, Result};
use kiosk_display::freshness::FreshnessProbe;
use kiosk_display::overlay::OverlayChannelConfig;
use kiosk_display::playback::{
    FrameCapture, MediaInspector, MediaMetadata, PlaybackTimings, RemoteMediaElement, StillFrame,
};
use kiosk_display::renderer::{DisplayRenderer, RendererDeps, RendererHandle, RendererSettings};
use kiosk_display::resolver::TemplateResolver;

pub const STILL_URI: &str = "data:image/png;base64,iVBORw==";

/// Serves scripted probe results; the last entry repeats once the script runs out
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<std::result::Result<String, ProbeError>>>,
    last: Mutex<Option<std::result::Result<String, ProbeError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_token(&self, token: &str) {
        self.script.lock().unwrap().push_back(Ok(token.to_string()));
    }

    pub fn push_error(&self, error: ProbeError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FreshnessProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> std::result::Result<String, ProbeError> {
        self.calls.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(ProbeError::Network("no script".to_string()))),
        }
    }
}

/// Reports a fixed duration for videos; URLs containing a marked fragment fail
#[derive(Default)]
pub struct FakeInspector {
    failing: Mutex<HashSet<String>>,
    inspected: Mutex<Vec<String>>,
    /// How long each inspection takes
    delay: Mutex<Duration>,
    pub video_duration_secs: f64,
}

impl FakeInspector {
    pub fn new(video_duration_secs: f64) -> Arc<Self> {
        Arc::new(Self {
            video_duration_secs,
            ..Default::default()
        })
    }

    /// Any URL containing `fragment` fails inspection
    pub fn fail_when(&self, fragment: &str) {
        self.failing.lock().unwrap().insert(fragment.to_string());
    }

    /// Make every later inspection take `delay`, like a slow ffprobe
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaInspector for FakeInspector {
    async fn inspect(&self, asset: &AssetReference) -> Result<MediaMetadata> {
        self.inspected.lock().unwrap().push(asset.url.clone());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| asset.url.contains(fragment.as_str()));
        if failing {
            return Err(Error::Media(format!("cannot decode {}", asset.url)));
        }
        Ok(MediaMetadata {
            duration_secs: if asset.is_video() { self.video_duration_secs } else { 0.0 },
            width: Some(1920),
            height: Some(1080),
        })
    }
}

pub struct FakeCapture;

#[async_trait]
impl FrameCapture for FakeCapture {
    async fn capture_first_frame(&self, _asset: &AssetReference) -> Result<StillFrame> {
        Ok(StillFrame {
            data_uri: STILL_URI.to_string(),
        })
    }
}

pub fn screen(name: &str) -> ScreenIdentity {
    ScreenIdentity::new(name).unwrap()
}

/// A renderer running against fakes
pub struct TestRenderer {
    pub handle: RendererHandle,
    pub probe: Arc<ScriptedProbe>,
    pub inspector: Arc<FakeInspector>,
    pub bus: EventBus,
    pub events: broadcast::Receiver<KioskEvent>,
    pub cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct TestRendererBuilder {
    template: String,
    screen: String,
    poll_interval: Duration,
    channel: Option<OverlayChannelConfig>,
    probe: Arc<ScriptedProbe>,
    inspector: Arc<FakeInspector>,
}

impl TestRendererBuilder {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            screen: "lobby".to_string(),
            poll_interval: Duration::from_secs(10),
            channel: None,
            probe: ScriptedProbe::new(),
            inspector: FakeInspector::new(10.0),
        }
    }

    pub fn screen(mut self, screen: &str) -> Self {
        self.screen = screen.to_string();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn channel(mut self, config: OverlayChannelConfig) -> Self {
        self.channel = Some(config);
        self
    }

    pub fn probe(mut self, probe: Arc<ScriptedProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn inspector(mut self, inspector: Arc<FakeInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn start(self) -> TestRenderer {
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let cancel = CancellationToken::new();

        let deps = RendererDeps {
            resolver: Arc::new(TemplateResolver::new(self.template).unwrap()),
            probe: self.probe.clone(),
            inspector: self.inspector.clone(),
            capture: Arc::new(FakeCapture),
            element: Arc::new(RemoteMediaElement::new(bus.clone())),
        };
        let settings = RendererSettings {
            screen: screen(&self.screen),
            display_mode: DisplayMode::Contain,
            poll_interval: self.poll_interval,
            playback: PlaybackTimings::default(),
            channel: self.channel,
        };

        let (renderer, handle) =
            DisplayRenderer::new(settings, deps, bus.clone(), cancel.clone()).unwrap();
        let task = tokio::spawn(renderer.run());

        TestRenderer {
            handle,
            probe: self.probe,
            inspector: self.inspector,
            bus,
            events,
            cancel,
            task,
        }
    }
}

impl TestRenderer {
    /// Drain every event published so far
    pub fn drain(&mut self) -> Vec<KioskEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    /// URL of the media currently on screen
    pub async fn shown_url(&self) -> Option<String> {
        self.handle.scene().await.media.map(|media| media.asset.url)
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Let spawned tasks run; under a paused clock this only returns once they are idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
