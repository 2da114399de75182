use log::{ debug, info, warn };
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{ Mutex, MutexGuard };

use crate::llm::chat::ChatClient;
use crate::llm::Provider;
use crate::models::chat::{ ChatMessage, Conversation, Role, VoiceSettings };
use crate::speech::{ SpeechService, Voice };

/// Read-only view of the conversation for whatever renders it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// The current error can only be fixed on the provider's site (key or billing).
    pub needs_account_action: bool,
    pub voice_settings: VoiceSettings,
    pub voice_supported: bool,
}

struct AgentState {
    conversation: Conversation,
    is_loading: bool,
    error: Option<String>,
    needs_account_action: bool,
    voice: VoiceSettings,
}

/// Owns the conversation and sequences user actions against the chat client
/// and the speech service.
///
/// State sits behind a lock that is released before every network or speech
/// await, so `toggle_voice`, `clear_chat` and friends stay responsive while a
/// request is in flight. The loading flag only guards `send_message` itself.
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    speech: Arc<SpeechService>,
    system_prompt: Option<String>,
    state: Mutex<AgentState>,
}

impl ChatAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        speech: Arc<SpeechService>,
        voice: VoiceSettings,
        system_prompt: Option<String>
    ) -> Self {
        let supported = speech.is_supported();
        let voice = VoiceSettings {
            enabled: voice.enabled && supported,
            ..voice.clamped()
        };
        info!(
            "Chat agent ready: provider={}, model={}, voice={}",
            chat_client.provider(),
            chat_client.model(),
            if voice.enabled { "on" } else { "off" }
        );

        Self {
            chat_client,
            speech,
            system_prompt,
            state: Mutex::new(AgentState {
                conversation: Conversation::new(),
                is_loading: false,
                error: None,
                needs_account_action: false,
                voice,
            }),
        }
    }

    async fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let state = self.state().await;
        ChatSnapshot {
            messages: state.conversation.messages().to_vec(),
            is_loading: state.is_loading,
            error: state.error.clone(),
            needs_account_action: state.needs_account_action,
            voice_settings: state.voice.clone(),
            voice_supported: self.speech.is_supported(),
        }
    }

    pub async fn is_loading(&self) -> bool {
        self.state().await.is_loading
    }

    pub async fn voice_settings(&self) -> VoiceSettings {
        self.state().await.voice.clone()
    }

    pub fn provider(&self) -> Provider {
        self.chat_client.provider()
    }

    pub fn voice_supported(&self) -> bool {
        self.speech.is_supported()
    }

    pub async fn available_voices(&self) -> Vec<Voice> {
        self.speech.available_voices().await
    }

    /// Sends `text` as the next user turn. Ignored while a request is loading
    /// or when the text is blank.
    pub async fn send_message(&self, text: &str) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }

        let history = {
            let mut state = self.state().await;
            if state.is_loading {
                debug!("Ignoring message while a request is in flight");
                return;
            }
            state.error = None;
            state.needs_account_action = false;
            state.conversation.push(ChatMessage::user(content));
            state.is_loading = true;
            state.conversation.messages().to_vec()
        };

        let result = self.chat_client.complete(&history, self.system_prompt.as_deref()).await;

        let to_speak = {
            let mut state = self.state().await;
            state.is_loading = false;
            match result {
                Ok(completion) => {
                    let reply = ChatMessage::assistant(completion.response);
                    let speak = state.voice.enabled.then(|| {
                        (self.speech.ticket(), reply.content().to_string(), state.voice.clone())
                    });
                    state.conversation.push(reply);
                    speak
                }
                Err(e) => {
                    warn!("Chat request failed: {}", e);
                    state.error = Some(e.to_string());
                    state.needs_account_action = e.needs_account_action();
                    None
                }
            }
        };

        if let Some((ticket, text, settings)) = to_speak {
            if let Err(e) = self.speech.speak(ticket, &text, &settings).await {
                warn!("Voice synthesis failed: {}", e);
            }
        }
    }

    /// Speaks an assistant message again. The message's playing flag is set
    /// for the duration and always cleared afterwards.
    pub async fn play_voice(&self, message_id: &str) {
        let (ticket, text, settings) = {
            let mut state = self.state().await;
            let content = match state.conversation.get(message_id) {
                Some(msg) if msg.role() == Role::Assistant => msg.content().to_string(),
                _ => {
                    return;
                }
            };
            state.conversation.mark_playing(message_id);
            (self.speech.ticket(), content, state.voice.clone())
        };

        if let Err(e) = self.speech.speak(ticket, &text, &settings).await {
            warn!("Voice playback failed: {}", e);
        }

        self.state().await.conversation.set_playing(message_id, false);
    }

    pub async fn toggle_voice(&self) -> bool {
        let enabled = {
            let mut state = self.state().await;
            state.voice.enabled = !state.voice.enabled;
            state.voice.enabled
        };
        self.speech.stop();
        info!("Voice output {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// Replaces voice name and factors; the enabled flag is left to `toggle_voice`.
    pub async fn update_voice_settings(&self, settings: VoiceSettings) -> VoiceSettings {
        let mut state = self.state().await;
        state.voice = VoiceSettings {
            enabled: state.voice.enabled,
            ..settings.clamped()
        };
        state.voice.clone()
    }

    pub async fn set_voice(&self, name: &str) -> VoiceSettings {
        let mut state = self.state().await;
        state.voice.voice = name.trim().to_string();
        state.voice.clone()
    }

    pub async fn clear_error(&self) {
        let mut state = self.state().await;
        state.error = None;
        state.needs_account_action = false;
    }

    pub async fn clear_chat(&self) {
        {
            let mut state = self.state().await;
            state.conversation.clear();
            state.error = None;
            state.needs_account_action = false;
        }
        self.speech.stop();
    }
}
