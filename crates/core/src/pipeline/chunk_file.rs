use std::path::{Path, PathBuf};

use crate::planning::domain::chunk_plan::ChunkSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Extracted,
    Submitted,
    Done,
    Failed,
}

/// A planned chunk and the file it is materialized into.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFile {
    pub span: ChunkSpan,
    pub path: PathBuf,
    pub state: ChunkState,
}

impl ChunkFile {
    pub fn pending(span: ChunkSpan, chunks_dir: &Path) -> Self {
        Self {
            span,
            path: chunks_dir.join(chunk_file_name(span.index)),
            state: ChunkState::Pending,
        }
    }

    pub fn index(&self) -> usize {
        self.span.index
    }
}

/// Zero-padded so a directory listing sorts in chunk order.
pub fn chunk_file_name(index: usize) -> String {
    format!("chunk_{index:05}.wav")
}
