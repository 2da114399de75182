//! Text-to-speech.
//!
//! [`SpeechEngine`] is the host capability (voice listing, one utterance at a
//! time, cancellation). [`SpeechService`] sits on top of it and applies
//! [`VoiceSettings`]: it skips disabled settings, resolves the voice by name
//! and preempts whatever is currently being spoken.

pub mod espeak;

use async_trait::async_trait;
use log::{ debug, info };
use serde::{ Deserialize, Serialize };
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::chat::VoiceSettings;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech synthesis is not supported in this environment")]
    Unsupported,

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Speech synthesis error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub language: String,
    pub is_default: bool,
}

/// One playback request handed to an engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// `None` plays with the engine's default voice.
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError>;

    /// Bumped whenever the engine's voice list may have changed since the
    /// last `list_voices` call.
    fn voices_revision(&self) -> u64 {
        0
    }

    /// Plays one utterance and resolves when it ends. An utterance that is
    /// cancelled ends normally.
    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError>;

    /// Stops the active utterance, if any.
    fn cancel(&self);
}

struct VoiceCache {
    revision: u64,
    voices: Vec<Voice>,
}

pub struct SpeechService {
    engine: Arc<dyn SpeechEngine>,
    voices: Mutex<Option<VoiceCache>>,
    stops: AtomicU64,
}

impl SpeechService {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine, voices: Mutex::new(None), stops: AtomicU64::new(0) }
    }

    /// Current stop generation. An utterance requested with this ticket is
    /// dropped if `stop()` runs before it reaches the engine.
    pub fn ticket(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_supported()
    }

    /// Voices the engine offers. Listed on first use and listed again when the
    /// cache is empty or the engine reports a new revision.
    pub async fn available_voices(&self) -> Vec<Voice> {
        if !self.engine.is_supported() {
            return Vec::new();
        }

        let revision = self.engine.voices_revision();
        let mut cache = self.voices.lock().await;
        let stale = match cache.as_ref() {
            Some(c) => c.revision != revision || c.voices.is_empty(),
            None => true,
        };

        if stale {
            match self.engine.list_voices().await {
                Ok(voices) => {
                    debug!("Loaded {} synthesis voices (revision {})", voices.len(), revision);
                    *cache = Some(VoiceCache { revision, voices });
                }
                Err(e) => {
                    info!("Could not list synthesis voices: {}", e);
                    return Vec::new();
                }
            }
        }

        cache.as_ref().map(|c| c.voices.clone()).unwrap_or_default()
    }

    /// Speaks `text` unless the settings are disabled or `stop()` ran since
    /// `ticket` was taken. Any utterance already playing is cancelled.
    pub async fn speak(
        &self,
        ticket: u64,
        text: &str,
        settings: &VoiceSettings
    ) -> Result<(), SpeechError> {
        if !settings.enabled {
            return Ok(());
        }
        if !self.engine.is_supported() {
            return Err(SpeechError::Unsupported);
        }

        self.engine.cancel();

        let voice = if settings.voice.is_empty() {
            None
        } else {
            let found = self
                .available_voices().await
                .into_iter()
                .find(|v| v.name == settings.voice);
            if found.is_none() {
                debug!("Voice '{}' not available, using engine default", settings.voice);
            }
            found
        };

        let settings = settings.clone().clamped();
        let utterance = Utterance {
            text: text.to_string(),
            voice,
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        };

        if self.ticket() != ticket {
            debug!("Speech stopped before playback started, dropping utterance");
            return Ok(());
        }
        self.engine.speak(utterance).await
    }

    pub fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.engine.cancel();
    }
}
