use std::path::Path;

use thiserror::Error;

use super::transcript::ChunkTranscript;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptionError {
    #[error("failed to load speech model: {0}")]
    Load(String),
    #[error("failed to read audio {path}: {reason}")]
    Audio { path: String, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Produces loaded model instances. Loading is expensive (seconds, hundreds
/// of MB), so callers load once and reuse the instance for many files.
pub trait SpeechModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn SpeechModel>, TranscriptionError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "speech-model"
    }
}

/// A loaded model instance. Stateful, hence `&mut self`; one instance is
/// only ever driven by one thread at a time.
pub trait SpeechModel: Send {
    fn transcribe(
        &mut self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<ChunkTranscript, TranscriptionError>;
}
