use std::path::{Path, PathBuf};

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::extraction::infrastructure::ffmpeg_audio_decoder::decode_mono;
use crate::shared::constants::TRANSCRIPTION_SAMPLE_RATE;
use crate::transcription::domain::speech_model::{
    SpeechModel, SpeechModelLoader, TranscriptionError,
};
use crate::transcription::domain::transcript::{ChunkTranscript, Segment};

/// Loads whisper.cpp models via whisper-rs.
///
/// Each `load` builds a fresh `WhisperContext`, so every pool worker owns
/// its own weights.
#[derive(Debug, Clone)]
pub struct WhisperModelLoader {
    model_path: PathBuf,
    threads_per_model: usize,
}

impl WhisperModelLoader {
    pub fn new(model_path: &Path, threads_per_model: usize) -> Result<Self, TranscriptionError> {
        if !model_path.exists() {
            return Err(TranscriptionError::Load(format!(
                "Whisper model not found at: {}",
                model_path.display()
            )));
        }
        Ok(Self {
            model_path: model_path.to_path_buf(),
            threads_per_model: threads_per_model.max(1),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl SpeechModelLoader for WhisperModelLoader {
    fn load(&self) -> Result<Box<dyn SpeechModel>, TranscriptionError> {
        let path = self
            .model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::Load("Invalid model path".into()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| TranscriptionError::Load(e.to_string()))?;
        Ok(Box::new(WhisperModel {
            context,
            threads: self.threads_per_model,
        }))
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

pub struct WhisperModel {
    context: WhisperContext,
    threads: usize,
}

impl SpeechModel for WhisperModel {
    fn transcribe(
        &mut self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<ChunkTranscript, TranscriptionError> {
        let audio_error = |reason: String| TranscriptionError::Audio {
            path: audio_path.display().to_string(),
            reason,
        };
        let samples = decode_mono(audio_path, TRANSCRIPTION_SAMPLE_RATE, None)
            .map_err(|e| audio_error(e.to_string()))?
            .ok_or_else(|| audio_error("no audio stream".into()))?;

        let mut state = self
            .context
            .create_state()
            .map_err(|e| TranscriptionError::Inference(format!("Failed to create state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language_hint.unwrap_or("auto")));
        params.set_translate(false);
        params.set_no_timestamps(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_n_threads(self.threads as i32);

        state
            .full(params, &samples)
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let mut segments = Vec::new();
        for idx in 0..state.full_n_segments() {
            let Some(segment) = state.get_segment(idx) else {
                continue;
            };
            let text = segment
                .to_str_lossy()
                .map(|cow| cow.trim().to_string())
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            // Segment timestamps are in centiseconds (10ms units)
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = (segment.end_timestamp() as f64 / 100.0).max(start);
            segments.push(Segment::new(text, start, end));
        }

        let language = match language_hint {
            Some(hint) => Some(hint.to_string()),
            None => whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string),
        };

        Ok(ChunkTranscript { language, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_nonexistent_path_returns_error() {
        let result = WhisperModelLoader::new(Path::new("/nonexistent/model.bin"), 2);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"), "Expected 'not found' in error, got: {err}");
    }

    #[test]
    #[ignore] // Requires whisper model file and sample media
    fn test_transcribe_sample_file() {
        let model = std::env::var("LONGSCRIBE_TEST_MODEL").unwrap();
        let media = std::env::var("LONGSCRIBE_TEST_MEDIA").unwrap();
        let loader = WhisperModelLoader::new(Path::new(&model), 2).unwrap();
        let mut instance = loader.load().unwrap();
        let result = instance.transcribe(Path::new(&media), None);
        assert!(result.is_ok(), "Transcription should not error: {result:?}");
    }
}
