pub mod agent;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod speech;

use agent::ChatAgent;
use cli::Args;
use config::prompt::resolve_system_prompt;
use config::ConfigError;
use llm::chat::new_client;
use llm::{ Provider, ProviderConfig };
use log::{ error, info };
use speech::espeak::EspeakEngine;
use speech::SpeechService;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let provider_config = ProviderConfig::from_args(&args).map_err(|e| {
        if let ConfigError::MissingApiKey { .. } = e {
            if let Ok(provider) = args.provider.parse::<Provider>() {
                error!("Create a {} API key at {}", provider.spec().display_name, provider.spec().keys_url);
            }
        }
        e
    })?;
    let system_prompt = resolve_system_prompt(
        args.system_prompt.as_deref(),
        args.system_prompt_path.as_deref()
    )?;

    info!("--- Core Configuration ---");
    info!("Provider: {}", provider_config.provider.spec().display_name);
    info!("Model: {}", provider_config.model);
    info!("Base URL: {}", provider_config.base_url);
    info!("Temperature: {}", provider_config.temperature);
    info!("Max Tokens: {}", provider_config.max_tokens);
    info!("Min Request Interval: {:?}", provider_config.min_request_interval);
    info!("System Prompt: {}", if system_prompt.is_some() { "custom" } else { "default" });
    info!("Voice Enabled: {}", args.voice_enabled);
    info!("Speech Synthesizer: {}", args.espeak_bin);
    info!("-------------------------");

    let chat_client = new_client(&provider_config)?;
    let engine = Arc::new(EspeakEngine::new(args.espeak_bin.clone()));
    let speech = Arc::new(SpeechService::new(engine));
    let agent = Arc::new(ChatAgent::new(chat_client, speech, args.voice_settings(), system_prompt));

    cli::repl::run(agent).await
}
