pub mod chat;
pub mod throttle;

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cli::Args;
use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    DeepSeek,
    OpenRouter,
}

/// Static facts about a provider. Every provider-specific string the client
/// needs lives here instead of in per-provider branches.
#[derive(Debug)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub env_key: &'static str,
    pub default_model: &'static str,
    pub keys_url: &'static str,
    pub billing_url: &'static str,
    pub usage_url: &'static str,
}

const OPENAI: ProviderSpec = ProviderSpec {
    id: "openai",
    display_name: "OpenAI",
    base_url: "https://api.openai.com/v1",
    env_key: "OPENAI_API_KEY",
    default_model: "gpt-3.5-turbo",
    keys_url: "https://platform.openai.com/api-keys",
    billing_url: "https://platform.openai.com/account/billing",
    usage_url: "https://platform.openai.com/usage",
};

const DEEPSEEK: ProviderSpec = ProviderSpec {
    id: "deepseek",
    display_name: "DeepSeek",
    base_url: "https://api.deepseek.com/v1",
    env_key: "DEEPSEEK_API_KEY",
    default_model: "deepseek-chat",
    keys_url: "https://platform.deepseek.com/api_keys",
    billing_url: "https://platform.deepseek.com/account/billing",
    usage_url: "https://platform.deepseek.com/usage",
};

const OPENROUTER: ProviderSpec = ProviderSpec {
    id: "openrouter",
    display_name: "OpenRouter",
    base_url: "https://openrouter.ai/api/v1",
    env_key: "OPENROUTER_API_KEY",
    default_model: "deepseek/deepseek-chat",
    keys_url: "https://openrouter.ai/keys",
    billing_url: "https://openrouter.ai/credits",
    usage_url: "https://openrouter.ai/activity",
};

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAI, Provider::DeepSeek, Provider::OpenRouter];

    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            Provider::OpenAI => &OPENAI,
            Provider::DeepSeek => &DEEPSEEK,
            Provider::OpenRouter => &OPENROUTER,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec().id)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseProviderError {
    message: String,
}

impl fmt::Display for ParseProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseProviderError {}

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.spec().id == wanted)
            .ok_or_else(|| ParseProviderError {
                message: format!(
                    "Invalid provider: '{}' (expected one of: openai, deepseek, openrouter)",
                    s
                ),
            })
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub min_request_interval: Duration,
    pub extra_headers: Vec<(String, String)>,
}

// The key stays out of debug output so configuration can be logged freely.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("min_request_interval", &self.min_request_interval)
            .field("extra_headers", &self.extra_headers)
            .finish()
    }
}

impl ProviderConfig {
    /// Config with the provider's defaults; mostly useful for tests and embedding.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        let spec = provider.spec();
        Self {
            provider,
            api_key: api_key.into(),
            model: spec.default_model.to_string(),
            base_url: spec.base_url.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            min_request_interval: Duration::from_millis(1000),
            extra_headers: Vec::new(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Builds the config from parsed arguments, looking up the provider's key
    /// variable through `lookup`. A missing or blank key is fatal.
    pub fn resolve<F>(args: &Args, lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let provider: Provider = args.provider
            .parse()
            .map_err(|e: ParseProviderError| ConfigError::InvalidProvider(e.to_string()))?;
        let spec = provider.spec();

        let api_key = args.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup(spec.env_key).filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey {
                provider: spec.display_name,
                env_key: spec.env_key,
            })?;

        let mut extra_headers = Vec::new();
        if provider == Provider::OpenRouter {
            if let Some(referer) = args.openrouter_referer.as_ref().filter(|v| !v.is_empty()) {
                extra_headers.push(("HTTP-Referer".to_string(), referer.clone()));
            }
            if let Some(title) = args.openrouter_title.as_ref().filter(|v| !v.is_empty()) {
                extra_headers.push(("X-Title".to_string(), title.clone()));
            }
        }

        Ok(Self {
            provider,
            api_key: api_key.trim().to_string(),
            model: args.chat_model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| spec.default_model.to_string()),
            base_url: args.chat_base_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| spec.base_url.to_string()),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            min_request_interval: Duration::from_millis(args.min_request_interval_ms),
            extra_headers,
        })
    }
}
