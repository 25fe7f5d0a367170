use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::transcription::domain::speech_model::{
    SpeechModel, SpeechModelLoader, TranscriptionError,
};
use crate::transcription::domain::transcript::ChunkTranscript;

/// Single-unit transcription outside the pool, for short inputs and for
/// sequential fallback.
///
/// Holds one model, loaded on first use and kept for later requests.
/// Concurrent callers take turns on it.
pub struct DirectTranscriber {
    loader: Arc<dyn SpeechModelLoader>,
    model: Mutex<Option<Box<dyn SpeechModel>>>,
}

impl DirectTranscriber {
    pub fn new(loader: Arc<dyn SpeechModelLoader>) -> Self {
        Self {
            loader,
            model: Mutex::new(None),
        }
    }

    pub fn transcribe(
        &self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<ChunkTranscript, TranscriptionError> {
        let mut slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            log::info!("Loading {} model for direct transcription", self.loader.name());
            *slot = Some(self.loader.load()?);
        }
        let Some(model) = slot.as_mut() else {
            return Err(TranscriptionError::Load("model unavailable".into()));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| {
            model.transcribe(audio_path, language_hint)
        })) {
            Ok(result) => result,
            Err(_) => {
                // The instance may be half-updated; reload on next use
                *slot = None;
                Err(TranscriptionError::Inference(format!(
                    "model panicked on {}",
                    audio_path.display()
                )))
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::worker_pool::test_support::ScriptedLoader;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn test_model_loaded_lazily_and_once() {
        let loader = ScriptedLoader::new(Duration::ZERO);
        let loads = loader.loads.clone();
        let direct = DirectTranscriber::new(Arc::new(loader));
        assert!(!direct.is_loaded());

        direct.transcribe(Path::new("/a/one.wav"), None).unwrap();
        let second = direct.transcribe(Path::new("/a/two.wav"), Some("de")).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(second.language.as_deref(), Some("de"));
        assert_eq!(second.segments[0].text, "two-a");
    }

    #[test]
    fn test_load_failure_is_retried_on_next_call() {
        let loader = ScriptedLoader::new(Duration::ZERO).failing_first(1);
        let direct = DirectTranscriber::new(Arc::new(loader));
        assert!(matches!(
            direct.transcribe(Path::new("/a/x.wav"), None),
            Err(TranscriptionError::Load(_))
        ));
        assert!(direct.transcribe(Path::new("/a/x.wav"), None).is_ok());
    }

    #[test]
    fn test_panic_becomes_error_and_drops_model() {
        let loader = ScriptedLoader::new(Duration::ZERO);
        let loads = loader.loads.clone();
        let direct = DirectTranscriber::new(Arc::new(loader));

        let err = direct.transcribe(Path::new("/a/panic.wav"), None).unwrap_err();
        assert!(matches!(err, TranscriptionError::Inference(_)));
        assert!(!direct.is_loaded());

        direct.transcribe(Path::new("/a/fine.wav"), None).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
