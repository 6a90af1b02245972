//! Software-clocked media element
//!
//! Keeps the authoritative playback position itself (`position += rate × elapsed`) and
//! publishes every command as a [`KioskEvent::MediaCommand`], so any number of front-ends
//! can mirror the element. A seek is committed once its command is published.

use async_trait::async_trait;
use kiosk_common::events::{EventBus, KioskEvent, MediaCommand};
use kiosk_common::time::now;
use kiosk_common::AssetReference;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::trace;

use super::media::{MediaElement, MediaMetadata};
use super::rate::clamp_rate;
use crate::error::{Error, Result};

/// Media element whose clock runs in-process
pub struct RemoteMediaElement {
    bus: EventBus,
    clock: Mutex<MediaClock>,
}

#[derive(Debug)]
struct MediaClock {
    loaded: bool,
    duration: Option<f64>,
    /// Position at `anchor`
    position: f64,
    anchor: Instant,
    rate: f64,
    playing: bool,
    reached_end: bool,
}

impl MediaClock {
    fn position_at(&self, at: Instant) -> f64 {
        if !self.playing {
            return self.position;
        }
        let advanced = self.position + self.rate * at.saturating_duration_since(self.anchor).as_secs_f64();
        match self.duration {
            Some(duration) => advanced.min(duration),
            None => advanced,
        }
    }

    /// Fold elapsed playback into `position` before changing rate or play state
    fn settle(&mut self) {
        let at = Instant::now();
        self.position = self.position_at(at);
        self.anchor = at;
        if self.duration.is_some_and(|d| self.position >= d) {
            self.reached_end = true;
        }
    }
}

impl RemoteMediaElement {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            clock: Mutex::new(MediaClock {
                loaded: false,
                duration: None,
                position: 0.0,
                anchor: Instant::now(),
                rate: 1.0,
                playing: false,
                reached_end: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MediaClock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, command: MediaCommand) {
        trace!(?command, "Media command");
        self.bus.emit_lossy(KioskEvent::MediaCommand {
            command,
            timestamp: now(),
        });
    }

    fn require_loaded(clock: &MediaClock) -> Result<()> {
        if clock.loaded {
            Ok(())
        } else {
            Err(Error::InvalidState("no media loaded".to_string()))
        }
    }

    pub fn playback_rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Whether playback has run into the end of the clip since the last load or seek
    pub fn reached_end(&self) -> bool {
        let mut clock = self.lock();
        clock.settle();
        clock.reached_end
    }
}

#[async_trait]
impl MediaElement for RemoteMediaElement {
    async fn load(&self, asset: &AssetReference, metadata: &MediaMetadata) -> Result<()> {
        {
            let mut clock = self.lock();
            clock.loaded = true;
            clock.duration = Some(metadata.duration_secs.max(0.0));
            clock.position = 0.0;
            clock.anchor = Instant::now();
            clock.rate = 1.0;
            clock.playing = false;
            clock.reached_end = false;
        }
        self.publish(MediaCommand::Load {
            url: asset.url.clone(),
            kind: asset.kind,
        });
        Ok(())
    }

    async fn seek(&self, position_secs: f64) -> Result<()> {
        let target = {
            let mut clock = self.lock();
            Self::require_loaded(&clock)?;
            let upper = clock.duration.unwrap_or(f64::MAX);
            let target = if position_secs.is_finite() {
                position_secs.clamp(0.0, upper)
            } else {
                0.0
            };
            clock.position = target;
            clock.anchor = Instant::now();
            clock.reached_end = false;
            target
        };
        self.publish(MediaCommand::Seek { position_secs: target });
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        {
            let mut clock = self.lock();
            Self::require_loaded(&clock)?;
            clock.settle();
            clock.playing = true;
        }
        self.publish(MediaCommand::Play);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        {
            let mut clock = self.lock();
            Self::require_loaded(&clock)?;
            clock.settle();
            clock.playing = false;
        }
        self.publish(MediaCommand::Pause);
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        let rate = clamp_rate(rate);
        {
            let mut clock = self.lock();
            Self::require_loaded(&clock)?;
            clock.settle();
            clock.rate = rate;
        }
        self.publish(MediaCommand::SetRate { rate });
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.lock().position_at(Instant::now())
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }
}
