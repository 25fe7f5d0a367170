use std::path::Path;

use crate::extraction::domain::chunk_extractor::{ChunkExtractor, ExtractionError};
use crate::extraction::infrastructure::ffmpeg_audio_decoder::decode_mono;
use crate::shared::constants::TRANSCRIPTION_SAMPLE_RATE;

/// Cuts a time range out of any ffmpeg-readable media file and writes it as
/// a 16 kHz mono 16-bit WAV, the input format speech models expect.
#[derive(Debug, Clone)]
pub struct FfmpegChunkExtractor {
    sample_rate: u32,
}

impl FfmpegChunkExtractor {
    pub fn new() -> Self {
        Self {
            sample_rate: TRANSCRIPTION_SAMPLE_RATE,
        }
    }
}

impl Default for FfmpegChunkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkExtractor for FfmpegChunkExtractor {
    fn extract(
        &self,
        source_path: &Path,
        start: f64,
        end: f64,
        dest_path: &Path,
    ) -> Result<(), ExtractionError> {
        let fail = |reason: String| ExtractionError::new(source_path, start, end, reason);

        if end <= start {
            return Err(fail("empty time range".into()));
        }

        let samples = decode_mono(source_path, self.sample_rate, Some((start, end)))
            .map_err(|e| fail(e.to_string()))?
            .ok_or_else(|| fail("no audio stream".into()))?;

        write_wav(dest_path, &samples, self.sample_rate).map_err(|e| fail(e.to_string()))
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}
