use thiserror::Error;

use crate::llm::ProviderSpec;

/// Body fragments providers use to report an exhausted balance, whatever the
/// status code (OpenAI sends `insufficient_quota` with a 429).
const BALANCE_MARKERS: [&str; 3] = ["insufficient balance", "insufficient_quota", "insufficient credits"];

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{provider} API key is not configured. Set {env_key} in your environment or .env file.")]
    MissingApiKey {
        provider: &'static str,
        env_key: &'static str,
    },

    #[error("Invalid API key. Please check your {provider} API key configuration.")]
    InvalidApiKey {
        provider: &'static str,
    },

    #[error(
        "Insufficient balance on your {provider} account. Add credits at {billing_url} and check your usage at {usage_url}."
    )]
    InsufficientBalance {
        provider: &'static str,
        billing_url: &'static str,
        usage_url: &'static str,
    },

    #[error("Access forbidden. Your {provider} API key does not have permission to use this model.")]
    Forbidden {
        provider: &'static str,
    },

    #[error(
        "Rate limit exceeded for {provider}. Wait a moment before sending another message, or check your usage at {usage_url}."
    )]
    RateLimited {
        provider: &'static str,
        usage_url: &'static str,
    },

    #[error("{provider} server error (HTTP {status}). Please try again later.")]
    Server {
        provider: &'static str,
        status: u16,
    },

    #[error("API request failed (HTTP {status}): {body}")]
    RequestFailed {
        status: u16,
        body: String,
    },

    #[error("Invalid response format from AI service")]
    MalformedResponse,

    #[error("Failed to reach {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ChatError {
    pub fn missing_api_key(spec: &'static ProviderSpec) -> Self {
        ChatError::MissingApiKey {
            provider: spec.display_name,
            env_key: spec.env_key,
        }
    }

    /// Maps a non-2xx response onto exactly one error variant.
    pub fn from_status(spec: &'static ProviderSpec, status: u16, body: &str) -> Self {
        let provider = spec.display_name;
        match status {
            401 => ChatError::InvalidApiKey { provider },
            402 => Self::insufficient_balance(spec),
            _ if mentions_insufficient_balance(body) => Self::insufficient_balance(spec),
            403 => ChatError::Forbidden { provider },
            429 => ChatError::RateLimited { provider, usage_url: spec.usage_url },
            s if s >= 500 => ChatError::Server { provider, status: s },
            s => ChatError::RequestFailed { status: s, body: body.trim().to_string() },
        }
    }

    fn insufficient_balance(spec: &'static ProviderSpec) -> Self {
        ChatError::InsufficientBalance {
            provider: spec.display_name,
            billing_url: spec.billing_url,
            usage_url: spec.usage_url,
        }
    }

    /// True when the user has to fix their key or account before retrying.
    pub fn needs_account_action(&self) -> bool {
        matches!(
            self,
            ChatError::MissingApiKey { .. } |
                ChatError::InvalidApiKey { .. } |
                ChatError::InsufficientBalance { .. } |
                ChatError::Forbidden { .. }
        )
    }
}

fn mentions_insufficient_balance(body: &str) -> bool {
    let body = body.to_lowercase();
    BALANCE_MARKERS.iter().any(|marker| body.contains(marker))
}
