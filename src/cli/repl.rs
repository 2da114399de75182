use log::debug;
use std::error::Error;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::agent::{ ChatAgent, ChatSnapshot };
use crate::llm::Provider;
use crate::models::chat::Role;

const HELP: &str = "\
Commands:
  /voice          toggle spoken replies (stops current speech)
  /voices         list synthesizer voices
  /use <name>     speak with the named voice (empty for default)
  /play [n]       replay message n, or the latest reply
  /history        show the conversation
  /dismiss        clear the current error
  /clear          start over
  /quit           exit
Anything else is sent to the assistant.";

#[derive(Debug, PartialEq)]
pub enum Command {
    Send(String),
    ToggleVoice,
    Voices,
    UseVoice(String),
    Play(Option<usize>),
    History,
    Dismiss,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "voice" => Command::ToggleVoice,
        "voices" => Command::Voices,
        "use" => Command::UseVoice(arg.to_string()),
        "play" => match arg {
            "" => Command::Play(None),
            n => match n.parse::<usize>() {
                Ok(n) if n > 0 => Command::Play(Some(n)),
                _ => Command::Unknown(line.to_string()),
            },
        },
        "history" => Command::History,
        "dismiss" => Command::Dismiss,
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

/// Id of the message to replay: the 1-based `index`, or the latest assistant reply.
pub fn playback_target(snapshot: &ChatSnapshot, index: Option<usize>) -> Option<String> {
    match index {
        Some(n) =>
            n
                .checked_sub(1)
                .and_then(|i| snapshot.messages.get(i))
                .map(|m| m.id().to_string()),
        None =>
            snapshot.messages
                .iter()
                .rev()
                .find(|m| m.role() == Role::Assistant)
                .map(|m| m.id().to_string()),
    }
}

fn print_history(snapshot: &ChatSnapshot) {
    if snapshot.messages.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for (i, msg) in snapshot.messages.iter().enumerate() {
        let marker = if msg.is_playing { " ~" } else { "" };
        println!("{:>3} [{}] {}{}: {}", i + 1, msg.timestamp().format("%H:%M:%S"), msg.role(), marker, msg.content());
    }
}

/// Where to fix key and billing problems, shown under account errors.
pub fn account_hint(provider: Provider) -> String {
    let spec = provider.spec();
    format!(
        "Manage your {} API keys at {} and credits at {}",
        spec.display_name,
        spec.keys_url,
        spec.billing_url
    )
}

fn print_outcome(snapshot: &ChatSnapshot, provider: Provider) {
    if let Some(err) = &snapshot.error {
        println!("error: {}", err);
        if snapshot.needs_account_action {
            println!("{}", account_hint(provider));
        }
        println!("(type /dismiss to clear)");
    } else if let Some(reply) = snapshot.messages.last().filter(|m| m.role() == Role::Assistant) {
        println!("assistant> {}", reply.content());
    }
}

/// Interactive shell on stdin/stdout. Replies are awaited in the background so
/// commands like `/voice` keep working while a request is in flight.
pub async fn run(agent: Arc<ChatAgent>) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Type a message and press enter. /help lists commands.");
    if !agent.voice_supported() {
        println!("(speech synthesis unavailable; replies will not be spoken)");
    } else if !agent.voice_settings().await.enabled {
        println!("(voice is off; /voice turns it on)");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_command(&line) else {
            continue;
        };
        debug!("Shell command: {:?}", command);

        match command {
            Command::Send(text) => {
                if agent.is_loading().await {
                    println!("(still waiting for the previous reply)");
                    continue;
                }
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    agent.send_message(&text).await;
                    print_outcome(&agent.snapshot().await, agent.provider());
                });
            }
            Command::ToggleVoice => {
                let enabled = agent.toggle_voice().await;
                if enabled && !agent.voice_supported() {
                    println!("voice: on (no synthesizer available)");
                } else {
                    println!("voice: {}", if enabled { "on" } else { "off" });
                }
            }
            Command::Voices => {
                let voices = agent.available_voices().await;
                if voices.is_empty() {
                    println!("(no voices available)");
                }
                for voice in voices {
                    let default = if voice.is_default { " (default)" } else { "" };
                    println!("  {} [{}]{}", voice.name, voice.language, default);
                }
            }
            Command::UseVoice(name) => {
                let settings = agent.set_voice(&name).await;
                if settings.voice.is_empty() {
                    println!("voice: synthesizer default");
                } else {
                    println!("voice: {}", settings.voice);
                }
            }
            Command::Play(index) => {
                let snapshot = agent.snapshot().await;
                match playback_target(&snapshot, index) {
                    Some(id) => {
                        let agent = Arc::clone(&agent);
                        tokio::spawn(async move {
                            agent.play_voice(&id).await;
                        });
                    }
                    None => println!("(nothing to play)"),
                }
            }
            Command::History => print_history(&agent.snapshot().await),
            Command::Dismiss => agent.clear_error().await,
            Command::Clear => {
                agent.clear_chat().await;
                println!("(conversation cleared)");
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {
                break;
            }
            Command::Unknown(line) => println!("unknown command: {} (try /help)", line),
        }
    }

    agent.clear_chat().await;
    Ok(())
}
