pub mod repl;

use clap::Parser;

use crate::models::chat::VoiceSettings;
use crate::speech::espeak::DEFAULT_ESPEAK_BIN;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Chat with a hosted LLM and hear the answers", long_about = None)]
pub struct Args {
    // --- Chat Provider Args ---
    /// LLM provider (openai, deepseek, openrouter)
    #[arg(long, env = "PROVIDER", default_value = "openai")]
    pub provider: String,

    /// API key for the provider. When unset, the provider's own variable is read
    /// (OPENAI_API_KEY, DEEPSEEK_API_KEY or OPENROUTER_API_KEY).
    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name (e.g., gpt-3.5-turbo, deepseek-chat). Defaults per provider.
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Override the provider base URL (the client appends /chat/completions)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// Sampling temperature
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Maximum tokens in a reply
    #[arg(long, env = "MAX_TOKENS", default_value = "500")]
    pub max_tokens: u32,

    /// Minimum spacing between chat requests in milliseconds. 0 disables it.
    #[arg(long, env = "MIN_REQUEST_INTERVAL_MS", default_value = "1000")]
    pub min_request_interval_ms: u64,

    /// System prompt text. Takes precedence over --system-prompt-path.
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// File holding the system prompt
    #[arg(long, env = "SYSTEM_PROMPT_PATH")]
    pub system_prompt_path: Option<String>,

    /// Value of the HTTP-Referer header sent to OpenRouter
    #[arg(long, env = "OPENROUTER_REFERER")]
    pub openrouter_referer: Option<String>,

    /// Value of the X-Title header sent to OpenRouter
    #[arg(long, env = "OPENROUTER_TITLE")]
    pub openrouter_title: Option<String>,

    // --- Voice Args ---
    /// Speak assistant replies (ignored when no synthesizer is available)
    #[arg(long, env = "VOICE_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub voice_enabled: bool,

    /// Voice name as listed by /voices. Empty uses the synthesizer default.
    #[arg(long, env = "VOICE_NAME", default_value = "")]
    pub voice_name: String,

    /// Speech rate factor (0.1 to 10)
    #[arg(long, env = "VOICE_RATE", default_value = "1.0")]
    pub voice_rate: f32,

    /// Speech pitch factor (0 to 2)
    #[arg(long, env = "VOICE_PITCH", default_value = "1.0")]
    pub voice_pitch: f32,

    /// Speech volume (0 to 1)
    #[arg(long, env = "VOICE_VOLUME", default_value = "1.0")]
    pub voice_volume: f32,

    /// Speech synthesizer binary
    #[arg(long, env = "ESPEAK_BIN", default_value = DEFAULT_ESPEAK_BIN)]
    pub espeak_bin: String,
}

impl Args {
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            enabled: self.voice_enabled,
            voice: self.voice_name.trim().to_string(),
            rate: self.voice_rate,
            pitch: self.voice_pitch,
            volume: self.voice_volume,
        }.clamped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_flags_become_clamped_settings() {
        let args = Args::parse_from([
            "voice-chat",
            "--voice-enabled",
            "false",
            "--voice-name",
            " en-gb ",
            "--voice-volume",
            "4",
        ]);
        let settings = args.voice_settings();
        assert!(!settings.enabled);
        assert_eq!(settings.voice, "en-gb");
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.rate, 1.0);
    }
}
