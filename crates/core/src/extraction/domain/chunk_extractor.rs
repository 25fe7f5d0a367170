use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to extract {start:.2}s-{end:.2}s of {path}: {reason}")]
pub struct ExtractionError {
    pub path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub reason: String,
}

impl ExtractionError {
    pub fn new(path: &Path, start: f64, end: f64, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            start,
            end,
            reason: reason.into(),
        }
    }
}

/// Domain interface for materializing one time range of a media file as a
/// standalone audio file.
///
/// Implementations are I/O bound and must tolerate many concurrent calls.
pub trait ChunkExtractor: Send + Sync {
    fn extract(
        &self,
        source_path: &Path,
        start: f64,
        end: f64,
        dest_path: &Path,
    ) -> Result<(), ExtractionError>;
}
