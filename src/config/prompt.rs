use std::fs;
use log::info;

use super::ConfigError;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, concise, and helpful responses. \
Keep responses conversational and engaging.";

/// Picks the system prompt for the session: inline text first, then the
/// prompt file, else `None` so the chat client falls back to its default.
pub fn resolve_system_prompt(
    inline: Option<&str>,
    path: Option<&str>
) -> Result<Option<String>, ConfigError> {
    if let Some(text) = inline.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Some(text.to_string()));
    }

    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => load_prompt_file(path).map(Some),
        None => Ok(None),
    }
}

pub fn load_prompt_file(path: &str) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::PromptFile {
        path: path.to_string(),
        source,
    })?;
    let prompt = content.trim();
    if prompt.is_empty() {
        return Err(ConfigError::EmptyPrompt(path.to_string()));
    }
    info!("Loaded system prompt from {} ({} chars)", path, prompt.len());
    Ok(prompt.to_string())
}
