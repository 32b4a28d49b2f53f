//! Speech capability seams. Transcription and synthesis engines are
//! external collaborators consumed through these traits.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a recorded audio sample into plain text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, SpeechError>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// Renders text into an audio artifact at the given path.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// Degraded transcriber used when no engine is wired: always returns an
/// empty transcript, which the session loop treats as a benign
/// "didn't catch that" turn.
pub struct SilentTranscriber;

#[async_trait]
impl Transcriber for SilentTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, SpeechError> {
        tracing::warn!(
            audio = %audio.display(),
            "No transcription engine configured; treating turn as empty"
        );
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "silent"
    }
}
