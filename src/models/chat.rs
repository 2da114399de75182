use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    id: String,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    pub is_playing: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_playing: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Ordered message history. Messages can be appended or all cleared at once;
/// the only per-message mutation is the playing flag.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Marks `id` as the only playing message.
    pub fn mark_playing(&mut self, id: &str) {
        for msg in &mut self.messages {
            msg.is_playing = msg.id == id;
        }
    }

    pub fn set_playing(&mut self, id: &str, playing: bool) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
            msg.is_playing = playing;
        }
    }
}

pub const RATE_RANGE: (f32, f32) = (0.1, 10.0);
pub const PITCH_RANGE: (f32, f32) = (0.0, 2.0);
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub enabled: bool,
    /// Voice name; empty selects the engine default.
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceSettings {
    /// Returns the settings with every factor pulled back inside its range.
    /// NaN falls back to the default factor.
    pub fn clamped(mut self) -> Self {
        self.rate = clamp_factor(self.rate, RATE_RANGE);
        self.pitch = clamp_factor(self.pitch, PITCH_RANGE);
        self.volume = clamp_factor(self.volume, VOLUME_RANGE);
        self
    }
}

fn clamp_factor(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() { 1.0_f32.clamp(min, max) } else { value.clamp(min, max) }
}
