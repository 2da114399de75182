use async_trait::async_trait;
use log::{ debug, warn };
use std::path::{ Path, PathBuf };
use std::process::Stdio;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Mutex, MutexGuard };
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;

use super::{ SpeechEngine, SpeechError, Utterance, Voice };

pub const DEFAULT_ESPEAK_BIN: &str = "espeak-ng";

const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Speech engine backed by the `espeak-ng` command-line synthesizer. Each
/// utterance is one child process; starting a new one kills the previous.
pub struct EspeakEngine {
    binary: String,
    supported: bool,
    next_id: AtomicU64,
    active: Mutex<Option<(u64, oneshot::Sender<()>)>>,
}

impl EspeakEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let supported = locate_binary(&binary).is_some();
        if supported {
            debug!("Using speech synthesizer '{}'", binary);
        } else {
            warn!("Speech synthesizer '{}' not found; voice output disabled", binary);
        }
        Self {
            binary,
            supported,
            next_id: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<(u64, oneshot::Sender<()>)>> {
        // A panicked speaker must not take voice output down with it.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, id: u64) {
        let mut active = self.active();
        if matches!(active.as_ref(), Some((current, _)) if *current == id) {
            *active = None;
        }
    }
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ESPEAK_BIN)
    }
}

/// Finds `binary` either as a path or on `PATH`.
pub fn locate_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}

/// Command-line flags for one utterance. The text itself goes to stdin.
pub fn speak_args(utterance: &Utterance) -> Vec<String> {
    let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round().clamp(80.0, 450.0);
    let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0);
    let amplitude = (100.0 * utterance.volume).round().clamp(0.0, 200.0);

    let mut args = vec![
        "-s".to_string(),
        format!("{}", words_per_minute as u32),
        "-p".to_string(),
        format!("{}", pitch as u32),
        "-a".to_string(),
        format!("{}", amplitude as u32),
    ];
    if let Some(voice) = &utterance.voice {
        args.push("-v".to_string());
        args.push(voice.language.clone());
    }
    args
}

/// Parses the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  2  en-gb           --/M      English_(Great_Britain) gmw/en     (en 2)
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let language = fields[1].to_string();
            Some(Voice {
                name: fields[3].to_string(),
                is_default: language == "en",
                language,
            })
        })
        .collect()
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        if !self.supported {
            return Err(SpeechError::Unsupported);
        }
        let output = Command::new(&self.binary).arg("--voices").output().await?;
        if !output.status.success() {
            return Err(
                SpeechError::Synthesis(
                    format!("{} --voices exited with {}", self.binary, output.status)
                )
            );
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        if !self.supported {
            return Err(SpeechError::Unsupported);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Some((previous, tx)) = self.active().replace((id, cancel_tx)) {
            debug!("Utterance {} preempted by {}", previous, id);
            let _ = tx.send(());
        }

        let mut child = match
            Command::new(&self.binary)
                .args(speak_args(&utterance))
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.finish(id);
                return Err(e.into());
            }
        };

        let stdin = child.stdin.take();
        let playback = async {
            if let Some(mut stdin) = stdin {
                stdin.write_all(utterance.text.as_bytes()).await?;
            }
            child.wait().await
        };

        let result = tokio::select! {
            status = playback => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(SpeechError::Synthesis(format!("{} exited with {}", self.binary, status))),
                Err(e) => Err(e.into()),
            },
            _ = cancel_rx => {
                debug!("Utterance {} cancelled", id);
                let _ = child.kill().await;
                Ok(())
            }
        };

        self.finish(id);
        result
    }

    fn cancel(&self) {
        if let Some((id, tx)) = self.active().take() {
            debug!("Cancelling utterance {}", id);
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{ Duration, Instant };

    fn utterance(rate: f32, pitch: f32, volume: f32, voice: Option<Voice>) -> Utterance {
        Utterance { text: "hello".to_string(), voice, rate, pitch, volume }
    }

    #[test]
    fn maps_default_factors_to_espeak_defaults() {
        let args = speak_args(&utterance(1.0, 1.0, 1.0, None));
        assert_eq!(args, vec!["-s", "175", "-p", "50", "-a", "100"]);
    }

    #[test]
    fn clamps_extreme_factors() {
        let args = speak_args(&utterance(10.0, 2.0, 0.0, None));
        assert_eq!(args, vec!["-s", "450", "-p", "99", "-a", "0"]);
        let args = speak_args(&utterance(0.1, 0.0, 1.0, None));
        assert_eq!(args[1], "80");
    }

    #[test]
    fn selects_voice_by_language_code() {
        let voice = Voice { name: "English_(Great_Britain)".to_string(), language: "en-gb".to_string(), is_default: false };
        let args = speak_args(&utterance(1.0, 1.0, 1.0, Some(voice)));
        assert_eq!(&args[6..], ["-v", "en-gb"]);
    }

    #[test]
    fn parses_voice_table() {
        let output = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
 5  af              --/M      Afrikaans          gmw/af\n \
 2  en              --/M      English            gmw/en\n \
 5  en-gb           --/M      English_(Great_Britain) gmw/en-GB  (en 2)\n\n";
        let voices = parse_voice_list(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "Afrikaans");
        assert_eq!(voices[0].language, "af");
        assert!(voices[1].is_default);
        assert_eq!(voices[2].name, "English_(Great_Britain)");
    }

    #[test]
    fn missing_binary_is_unsupported() {
        let engine = EspeakEngine::new("/nonexistent/voice-chat/espeak-ng");
        assert!(!engine.is_supported());
        assert!(locate_binary("surely-not-a-real-binary-name").is_none());
    }

    // `sh -s` runs the utterance text as a script, which stands in for a
    // synthesizer that stops reading stdin while it plays.
    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_interrupts_while_text_is_still_being_written() {
        let engine = Arc::new(EspeakEngine::new("sh"));
        assert!(engine.is_supported());

        let mut text = String::from("sleep 5\n#");
        text.push_str(&"x".repeat(512 * 1024));
        text.push('\n');

        let speaker = Arc::clone(&engine);
        let task = tokio::spawn(async move {
            speaker.speak(Utterance { text, voice: None, rate: 1.0, pitch: 1.0, volume: 1.0 }).await
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = Instant::now();
        engine.cancel();
        let result = tokio::time::timeout(Duration::from_secs(3), task).await.expect("speak did not stop");
        assert!(result.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unsupported_engine_refuses_to_speak() {
        let engine = EspeakEngine::new("/nonexistent/voice-chat/espeak-ng");
        let result = engine.speak(utterance(1.0, 1.0, 1.0, None)).await;
        assert!(matches!(result, Err(SpeechError::Unsupported)));
        engine.cancel();
    }
}
