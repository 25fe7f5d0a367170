use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A span of recognized text, in seconds relative to whatever timeline the
/// producer transcribed (a chunk's own timeline until merged).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            text: self.text.clone(),
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// What a speech model returns for one audio file.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ChunkTranscript {
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionMode {
    /// Short input, transcribed as a single unit.
    Sequential,
    /// Chunked and fanned out over the worker pool.
    Parallel,
    /// Long input that had to bypass an unhealthy pool.
    SequentialFallback,
}

impl fmt::Display for TranscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionMode::Sequential => write!(f, "sequential"),
            TranscriptionMode::Parallel => write!(f, "parallel"),
            TranscriptionMode::SequentialFallback => write!(f, "sequential_fallback"),
        }
    }
}

/// The merged, globally time-aligned result of one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub language: Option<String>,
    pub segments: Vec<Segment>,
    pub chunk_count: usize,
    pub mode_used: TranscriptionMode,
    /// Set only when a best-effort policy returned fewer chunks than planned.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub missing_chunks: Vec<usize>,
    /// Model time per transcribed chunk, in chunk order.
    #[serde(default)]
    pub chunk_processing_secs: Vec<f64>,
    #[serde(default)]
    pub elapsed_secs: f64,
}

impl Transcription {
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_secs = elapsed.as_secs_f64();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_segment_shifted() {
        let s = Segment::new("hi", 1.0, 2.5).shifted(120.0);
        assert_relative_eq!(s.start, 121.0);
        assert_relative_eq!(s.end, 122.5);
        assert_eq!(s.text, "hi");
    }

    #[test]
    fn test_segment_duration() {
        assert_relative_eq!(Segment::new("x", 2.0, 2.8).duration(), 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_text_joins_trimmed_segments() {
        let t = Transcription {
            language: Some("en".into()),
            segments: vec![
                Segment::new(" Hello", 0.0, 1.0),
                Segment::new("  ", 1.0, 1.5),
                Segment::new("world ", 1.5, 2.0),
            ],
            chunk_count: 1,
            mode_used: TranscriptionMode::Sequential,
            partial: false,
            missing_chunks: vec![],
            chunk_processing_secs: vec![],
            elapsed_secs: 0.0,
        };
        assert_eq!(t.text(), "Hello world");
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&TranscriptionMode::SequentialFallback).unwrap();
        assert_eq!(json, "\"sequential_fallback\"");
    }
}
