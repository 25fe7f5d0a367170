use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;

use crate::extraction::domain::chunk_extractor::{ChunkExtractor, ExtractionError};
use crate::planning::domain::chunk_plan::{ChunkPlan, ChunkSpan};
use crate::pipeline::chunk_file::{ChunkFile, ChunkState};

#[derive(Debug)]
pub enum ExtractionFailure {
    Failed(ExtractionError),
    /// The deadline passed with `extracted` chunks done.
    DeadlineExceeded { extracted: usize },
}

/// Materializes every chunk of a plan with a bounded number of extractor
/// threads.
///
/// Stops handing out work at the first failure; chunk files already written
/// are left for the session cleanup.
pub struct ChunkExtractionRunner {
    extractor: Arc<dyn ChunkExtractor>,
    concurrency: usize,
}

impl ChunkExtractionRunner {
    pub fn new(extractor: Arc<dyn ChunkExtractor>, concurrency: usize) -> Self {
        Self {
            extractor,
            concurrency: concurrency.max(1),
        }
    }

    pub fn run(
        &self,
        source_path: &Path,
        plan: &ChunkPlan,
        chunks_dir: &Path,
        deadline: Instant,
    ) -> Result<Vec<ChunkFile>, ExtractionFailure> {
        let mut files: Vec<ChunkFile> = plan
            .spans()
            .iter()
            .map(|span| ChunkFile::pending(*span, chunks_dir))
            .collect();
        if files.is_empty() {
            return Ok(files);
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(ChunkSpan, PathBuf)>();
        for file in &files {
            let _ = job_tx.send((file.span, file.path.clone()));
        }
        drop(job_tx);

        let (done_tx, done_rx) =
            crossbeam_channel::unbounded::<(usize, Result<(), ExtractionError>)>();
        let abort = Arc::new(AtomicBool::new(false));

        let thread_count = self.concurrency.min(files.len());
        let mut handles = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let extractor = self.extractor.clone();
            let source = source_path.to_path_buf();
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let abort = abort.clone();
            let spawned = thread::Builder::new()
                .name(format!("chunk-extract-{i}"))
                .spawn(move || {
                    for (span, dest) in jobs.iter() {
                        if abort.load(Ordering::SeqCst) {
                            break;
                        }
                        let result = extractor.extract(&source, span.start, span.end, &dest);
                        if done.send((span.index, result)).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::warn!("Failed to spawn extraction thread {i}: {e}"),
            }
        }
        drop(done_tx);

        let mut extracted = 0;
        while extracted < files.len() {
            match done_rx.recv_deadline(deadline) {
                Ok((index, Ok(()))) => {
                    files[index].state = ChunkState::Extracted;
                    extracted += 1;
                }
                Ok((index, Err(e))) => {
                    files[index].state = ChunkState::Failed;
                    abort.store(true, Ordering::SeqCst);
                    join_all(handles);
                    return Err(ExtractionFailure::Failed(e));
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Threads still inside the extractor finish on their own
                    abort.store(true, Ordering::SeqCst);
                    return Err(ExtractionFailure::DeadlineExceeded { extracted });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let missing = files
                        .iter()
                        .find(|f| f.state == ChunkState::Pending)
                        .map(|f| f.span)
                        .unwrap_or(ChunkSpan {
                            index: 0,
                            start: 0.0,
                            end: plan.total_duration(),
                        });
                    join_all(handles);
                    return Err(ExtractionFailure::Failed(ExtractionError::new(
                        source_path,
                        missing.start,
                        missing.end,
                        "extraction thread exited early",
                    )));
                }
            }
        }

        join_all(handles);
        Ok(files)
    }
}

fn join_all(handles: Vec<thread::JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            log::error!("Chunk extraction thread panicked");
        }
    }
}
