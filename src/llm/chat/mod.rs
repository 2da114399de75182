pub mod completions;
pub mod error;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{ Provider, ProviderConfig };
use crate::models::chat::ChatMessage;
use self::completions::CompletionsChatClient;

pub use self::error::ChatError;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub response: String,
}

/// Produces the next assistant turn for a conversation.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends `history` (role and content of each message, in order) behind a
    /// system prompt. `system_prompt` overrides the client's default.
    async fn complete(
        &self,
        history: &[ChatMessage],
        system_prompt: Option<&str>
    ) -> Result<CompletionResponse, ChatError>;

    fn provider(&self) -> Provider;

    fn model(&self) -> String;
}

pub fn new_client(config: &ProviderConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client = CompletionsChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
