pub mod prompt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    InvalidProvider(String),

    #[error("{provider} API key is not configured. Set {env_key} in your environment or .env file.")]
    MissingApiKey {
        provider: &'static str,
        env_key: &'static str,
    },

    #[error("Failed to read system prompt file '{path}': {source}")]
    PromptFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("System prompt file '{0}' is empty")]
    EmptyPrompt(String),
}
