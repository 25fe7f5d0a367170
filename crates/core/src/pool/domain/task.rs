use std::path::PathBuf;
use std::time::Duration;

use crate::session::domain::session::SessionId;
use crate::transcription::domain::speech_model::TranscriptionError;
use crate::transcription::domain::transcript::Segment;

/// One chunk of work for the pool. Immutable once created.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub chunk_path: PathBuf,
    pub language_hint: Option<String>,
}

/// A successfully transcribed chunk. Segment times are local to the chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkResult {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub detected_language: Option<String>,
    pub segments: Vec<Segment>,
    pub processing_time: Duration,
    pub worker_id: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskFailure {
    /// The model returned an error; the worker is still alive.
    Transcription(TranscriptionError),
    /// The worker died while holding the task.
    WorkerCrashed { worker_id: usize, message: String },
}

/// What travels back on the shared result channel, keyed by
/// `(session_id, chunk_index)` rather than by arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskOutcome {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub result: Result<ChunkResult, TaskFailure>,
}
