use async_trait::async_trait;
use log::{ debug, info, warn };
use reqwest::{
    Client as HttpClient,
    header::{ HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE },
};
use serde::{ Deserialize, Serialize };

use super::{ ChatClient, ChatError, CompletionResponse };
use crate::config::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::llm::throttle::RequestGate;
use crate::llm::{ Provider, ProviderConfig };
use crate::models::chat::ChatMessage;

/// Client for OpenAI-compatible `chat/completions` endpoints. All three
/// providers speak the same wire format; they differ only in their table entry.
pub struct CompletionsChatClient {
    http: HttpClient,
    provider: Provider,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    gate: RequestGate,
}

#[derive(Serialize, Debug)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionChoiceMessage>,
}

#[derive(Deserialize)]
struct CompletionChoiceMessage {
    content: Option<String>,
}

impl CompletionsChatClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ChatError> {
        let spec = config.provider.spec();
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(ChatError::missing_api_key(spec));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_|
            ChatError::InvalidApiKey { provider: spec.display_name }
        )?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        for (name, value) in &config.extra_headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}' for {}", name, spec.display_name),
            }
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|source| ChatError::Transport { provider: spec.display_name, source })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!(
            "{} chat client ready: model={}, endpoint={}, min interval={:?}",
            spec.display_name,
            config.model,
            endpoint,
            config.min_request_interval
        );

        Ok(Self {
            http,
            provider: config.provider,
            model: config.model.clone(),
            endpoint,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            gate: RequestGate::new(config.min_request_interval),
        })
    }

    fn build_request<'a>(
        &'a self,
        history: &'a [ChatMessage],
        system_prompt: Option<&'a str>
    ) -> CompletionRequest<'a> {
        let system = system_prompt.unwrap_or(&self.system_prompt);
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(CompletionMessage { role: "system", content: system });
        messages.extend(
            history.iter().map(|msg| CompletionMessage {
                role: msg.role().as_str(),
                content: msg.content(),
            })
        );

        CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn parse_completion(body: &str) -> Result<String, ChatError> {
    let parsed: CompletionBody = serde_json::from_str(body).map_err(|e| {
        debug!("Completion body did not parse: {}", e);
        ChatError::MalformedResponse
    })?;

    parsed.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or(ChatError::MalformedResponse)
}

#[async_trait]
impl ChatClient for CompletionsChatClient {
    async fn complete(
        &self,
        history: &[ChatMessage],
        system_prompt: Option<&str>
    ) -> Result<CompletionResponse, ChatError> {
        let spec = self.provider.spec();
        let req = self.build_request(history, system_prompt);

        self.gate.ready().await;
        debug!("POST {} ({} messages)", self.endpoint, req.messages.len());

        let resp = self.http
            .post(&self.endpoint)
            .json(&req)
            .send().await
            .map_err(|source| ChatError::Transport { provider: spec.display_name, source })?;

        let status = resp.status();
        let body = resp
            .text().await
            .map_err(|source| ChatError::Transport { provider: spec.display_name, source })?;

        if !status.is_success() {
            let err = ChatError::from_status(spec, status.as_u16(), &body);
            warn!("{} request failed with HTTP {}: {}", spec.display_name, status.as_u16(), err);
            return Err(err);
        }

        let content = parse_completion(&body)?;
        Ok(CompletionResponse { response: content })
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CompletionsChatClient {
        CompletionsChatClient::from_config(&ProviderConfig::new(Provider::OpenAI, "sk-test")).unwrap()
    }

    #[test]
    fn blank_key_fails_before_any_request() {
        let err = CompletionsChatClient::from_config(&ProviderConfig::new(Provider::DeepSeek, "  ")).err();
        assert!(matches!(err, Some(ChatError::MissingApiKey { env_key: "DEEPSEEK_API_KEY", .. })));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mut config = ProviderConfig::new(Provider::OpenRouter, "sk-or");
        config.base_url = "http://localhost:9999/api/v1/".to_string();
        let client = CompletionsChatClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:9999/api/v1/chat/completions");
    }

    #[test]
    fn request_leads_with_system_prompt() {
        let client = client();
        let history = vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi"), ChatMessage::user("Bye")];

        let req = serde_json::to_value(client.build_request(&history, None)).unwrap();
        let messages = req["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(messages[1], serde_json::json!({ "role": "user", "content": "Hello" }));
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "Bye");
        assert_eq!(req["model"], "gpt-3.5-turbo");
        assert_eq!(req["max_tokens"], 500);
    }

    #[test]
    fn override_replaces_default_prompt() {
        let client = client();
        let req = client.build_request(&[], Some("Answer in Dutch."));
        assert_eq!(req.messages[0].content, "Answer in Dutch.");
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}},{"message":{"content":"ignored"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Hi there");
    }

    #[test]
    fn rejects_bodies_without_choice_content() {
        for body in [
            "{}",
            r#"{"choices":[]}"#,
            r#"{"choices":[{}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            "not json",
        ] {
            assert!(matches!(parse_completion(body), Err(ChatError::MalformedResponse)), "{}", body);
        }
    }
}
