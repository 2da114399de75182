//! Deterministic stand-ins for the chat endpoint and the speech engine.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::{ watch, Semaphore };

use voice_chat::agent::ChatAgent;
use voice_chat::llm::chat::{ ChatClient, ChatError, CompletionResponse };
use voice_chat::llm::Provider;
use voice_chat::models::chat::{ ChatMessage, Role, VoiceSettings };
use voice_chat::speech::{ SpeechEngine, SpeechError, SpeechService, Utterance, Voice };

pub enum Reply {
    Text(&'static str),
    Status(u16, &'static str),
    Malformed,
}

/// Chat client answering from a script. With `hold`, every call waits for
/// `release()` before answering.
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Vec<(Role, String)>>>,
    prompts: Mutex<Vec<Option<String>>>,
    hold: bool,
    gate: Semaphore,
}

impl ScriptedChatClient {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            hold: false,
            gate: Semaphore::new(0),
        })
    }

    pub fn held(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            hold: true,
            gate: Semaphore::new(0),
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> Vec<Vec<(Role, String)>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<Option<String>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(
        &self,
        history: &[ChatMessage],
        system_prompt: Option<&str>
    ) -> Result<CompletionResponse, ChatError> {
        self.calls
            .lock()
            .unwrap()
            .push(history.iter().map(|m| (m.role(), m.content().to_string())).collect());
        self.prompts.lock().unwrap().push(system_prompt.map(str::to_string));

        if self.hold {
            self.gate.acquire().await.unwrap().forget();
        }

        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Malformed);
        match reply {
            Reply::Text(text) => Ok(CompletionResponse { response: text.to_string() }),
            Reply::Status(status, body) => Err(ChatError::from_status(Provider::OpenAI.spec(), status, body)),
            Reply::Malformed => Err(ChatError::MalformedResponse),
        }
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn model(&self) -> String {
        "scripted".to_string()
    }
}

/// Speech engine that records utterances. With `hold` set, an utterance
/// lasts until the next `cancel()`. With `hold_listing` set, `list_voices`
/// waits for `release_listing()`.
pub struct FakeSpeechEngine {
    pub supported: bool,
    pub fail: AtomicBool,
    pub hold: AtomicBool,
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
    pub active: AtomicUsize,
    pub hold_listing: AtomicBool,
    pub listings: AtomicUsize,
    listing_gate: Semaphore,
    cancelled: watch::Sender<u64>,
}

impl FakeSpeechEngine {
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    pub fn unsupported() -> Arc<Self> {
        Self::build(false)
    }

    fn build(supported: bool) -> Arc<Self> {
        let (cancelled, _) = watch::channel(0);
        Arc::new(Self {
            supported,
            fail: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            hold_listing: AtomicBool::new(false),
            listings: AtomicUsize::new(0),
            listing_gate: Semaphore::new(0),
            cancelled,
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn release_listing(&self) {
        self.listing_gate.add_permits(1);
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeechEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.hold_listing.load(Ordering::SeqCst) {
            self.listing_gate.acquire().await.unwrap().forget();
        }
        Ok(vec![Voice { name: "Fake".to_string(), language: "en".to_string(), is_default: true }])
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        let mut cancelled = self.cancelled.subscribe();
        self.spoken.lock().unwrap().push(utterance.text);

        if self.fail.load(Ordering::SeqCst) {
            return Err(SpeechError::Synthesis("synthesis-failed".to_string()));
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            let _ = cancelled.changed().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.send_modify(|generation| *generation += 1);
    }
}

pub fn agent(chat: Arc<ScriptedChatClient>, engine: Arc<FakeSpeechEngine>, voice_enabled: bool) -> Arc<ChatAgent> {
    let speech = Arc::new(SpeechService::new(engine));
    let voice = VoiceSettings { enabled: voice_enabled, ..VoiceSettings::default() };
    Arc::new(ChatAgent::new(chat, speech, voice, None))
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn wait_until<F, Fut>(mut check: F)
    where F: FnMut() -> Fut, Fut: std::future::Future<Output = bool>
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
