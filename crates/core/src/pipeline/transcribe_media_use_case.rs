use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::extraction::domain::chunk_extractor::{ChunkExtractor, ExtractionError};
use crate::pipeline::chunk_extraction::{ChunkExtractionRunner, ExtractionFailure};
use crate::pipeline::chunk_file::{ChunkFile, ChunkState};
use crate::pipeline::direct_transcriber::DirectTranscriber;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::transcript_merger::TranscriptMerger;
use crate::planning::domain::chunk_plan::{ChunkPlan, ChunkPlanner, PlanError};
use crate::pool::domain::pool_health::PoolHealth;
use crate::pool::domain::task::{ChunkResult, Task};
use crate::pool::result_subscription::ResultSubscription;
use crate::pool::worker_pool::{PoolError, WorkerPool};
use crate::session::domain::session::{AreaKind, SessionId};
use crate::session::session_store::{SessionStore, StorageError};
use crate::shared::config::{PartialPolicy, TranscriptionConfig};
use crate::shared::constants::MAX_DURATION_SECS;
use crate::transcription::domain::speech_model::TranscriptionError;
use crate::transcription::domain::transcript::{Transcription, TranscriptionMode};

/// Requester recorded in session metadata when the caller gives none.
pub const DEFAULT_REQUESTER: &str = "local";

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error(
        "session {session_id} exceeded its {timeout:?} deadline with {completed}/{total} chunks done"
    )]
    SessionTimeout {
        session_id: SessionId,
        timeout: Duration,
        completed: usize,
        total: usize,
    },
    #[error("chunk {chunk_index} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: PoolError,
    },
}

enum ParallelOutcome {
    Completed(Transcription),
    /// The pool stopped being usable; the reason is logged by the caller.
    Fallback(String),
}

enum Collection {
    Results(Vec<ChunkResult>),
    Fallback(String),
}

/// Transcribes one media file, fanning long inputs out over the shared
/// worker pool.
///
/// Inputs shorter than the duration threshold go straight to a single model.
/// Longer ones are split into chunks inside a private session, transcribed by
/// the pool and stitched back together on the source timeline. When the pool
/// is not healthy the whole input is transcribed in one pass instead, so a
/// pool failure never fails the request by itself.
///
/// One instance is shared by all concurrent requests.
pub struct TranscribeMediaUseCase {
    pool: Arc<WorkerPool>,
    store: Arc<SessionStore>,
    extraction: ChunkExtractionRunner,
    direct: Arc<DirectTranscriber>,
    config: TranscriptionConfig,
}

impl TranscribeMediaUseCase {
    pub fn new(
        pool: Arc<WorkerPool>,
        store: Arc<SessionStore>,
        extractor: Arc<dyn ChunkExtractor>,
        direct: Arc<DirectTranscriber>,
        config: TranscriptionConfig,
    ) -> Self {
        Self {
            pool,
            store,
            extraction: ChunkExtractionRunner::new(extractor, config.extract_concurrency),
            direct,
            config,
        }
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    pub fn transcribe(
        &self,
        source_path: &Path,
        total_duration: f64,
        language_hint: Option<&str>,
    ) -> Result<Transcription, TranscribeError> {
        self.transcribe_as(
            DEFAULT_REQUESTER,
            source_path,
            total_duration,
            language_hint,
            &mut NullPipelineLogger,
        )
    }

    /// Like [`transcribe`](Self::transcribe), recording `requester` in the
    /// session metadata and reporting progress to `logger`.
    pub fn transcribe_as(
        &self,
        requester: &str,
        source_path: &Path,
        total_duration: f64,
        language_hint: Option<&str>,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Transcription, TranscribeError> {
        let started = Instant::now();
        let plan = ChunkPlanner::plan(total_duration, self.config.chunk_length_secs)?;

        let transcription = if total_duration < self.config.duration_threshold_secs {
            logger.info(&format!(
                "{}: {total_duration:.0}s is below the {:.0}s threshold, transcribing in one pass",
                source_path.display(),
                self.config.duration_threshold_secs
            ));
            self.transcribe_whole(source_path, language_hint, TranscriptionMode::Sequential, logger)?
        } else {
            let outcome = match self.pool_unusable() {
                Some(reason) => ParallelOutcome::Fallback(reason),
                None => self.transcribe_parallel(
                    requester,
                    source_path,
                    &plan,
                    language_hint,
                    started,
                    logger,
                )?,
            };
            match outcome {
                ParallelOutcome::Completed(transcription) => transcription,
                ParallelOutcome::Fallback(reason) => {
                    log::warn!(
                        "Falling back to sequential transcription of {}: {reason}",
                        source_path.display()
                    );
                    logger.metric("fallbacks", 1.0);
                    self.transcribe_whole(
                        source_path,
                        language_hint,
                        TranscriptionMode::SequentialFallback,
                        logger,
                    )?
                }
            }
        };

        logger.summary();
        Ok(transcription.with_elapsed(started.elapsed()))
    }

    fn pool_unusable(&self) -> Option<String> {
        match self.pool.health() {
            PoolHealth::Healthy => None,
            health => Some(format!("worker pool is {health}")),
        }
    }

    fn transcribe_whole(
        &self,
        source_path: &Path,
        language_hint: Option<&str>,
        mode: TranscriptionMode,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Transcription, TranscribeError> {
        let t0 = Instant::now();
        let transcript = self.direct.transcribe(source_path, language_hint)?;
        let took = t0.elapsed();
        logger.timing("transcribe", took.as_secs_f64() * 1000.0);
        logger.progress(1, 1);

        let mut segments = transcript.segments;
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        Ok(Transcription {
            language: language_hint.map(str::to_string).or(transcript.language),
            segments,
            chunk_count: 1,
            mode_used: mode,
            partial: false,
            missing_chunks: Vec::new(),
            chunk_processing_secs: vec![took.as_secs_f64()],
            elapsed_secs: 0.0,
        })
    }

    fn transcribe_parallel(
        &self,
        requester: &str,
        source_path: &Path,
        plan: &ChunkPlan,
        language_hint: Option<&str>,
        started: Instant,
        logger: &mut dyn PipelineLogger,
    ) -> Result<ParallelOutcome, TranscribeError> {
        let deadline = started
            .checked_add(self.config.session_timeout())
            .unwrap_or_else(|| started + Duration::from_secs(MAX_DURATION_SECS as u64));
        let session = self
            .store
            .open(requester, &source_path.display().to_string())?;
        let guard = self.store.guard(session);
        let session_id = guard.id().clone();
        logger.info(&format!(
            "Session {session_id}: {} chunk(s) of {:.0}s",
            plan.len(),
            plan.chunk_length()
        ));

        let t0 = Instant::now();
        let chunks_dir = self.store.area(&guard, AreaKind::Chunks);
        let mut files = match self.extraction.run(source_path, plan, &chunks_dir, deadline) {
            Ok(files) => files,
            Err(ExtractionFailure::Failed(e)) => {
                log::error!("Session {session_id} aborted: {e}");
                return Err(e.into());
            }
            Err(ExtractionFailure::DeadlineExceeded { extracted }) => {
                log::error!(
                    "Session {session_id} ran out of time extracting ({extracted}/{} chunks)",
                    plan.len()
                );
                return Err(TranscribeError::SessionTimeout {
                    session_id,
                    timeout: self.config.session_timeout(),
                    completed: 0,
                    total: plan.len(),
                });
            }
        };
        logger.timing("extract", t0.elapsed().as_secs_f64() * 1000.0);

        // Subscribe first so no outcome can arrive unrouted
        let mut subscription = self.pool.subscribe(&session_id);
        if let Some(reason) = self.pool_unusable() {
            return Ok(ParallelOutcome::Fallback(reason));
        }
        for file in files.iter_mut() {
            if let Err(e) = self.pool.submit(chunk_task(&session_id, file, language_hint)) {
                return Ok(ParallelOutcome::Fallback(format!("submission failed: {e}")));
            }
            file.state = ChunkState::Submitted;
        }
        logger.metric("queued_tasks", self.pool.stats().queued_tasks as f64);

        let t0 = Instant::now();
        let results = match self.collect(
            &session_id,
            &mut subscription,
            &mut files,
            language_hint,
            deadline,
            logger,
        )? {
            Collection::Results(results) => results,
            Collection::Fallback(reason) => return Ok(ParallelOutcome::Fallback(reason)),
        };
        logger.timing("transcribe", t0.elapsed().as_secs_f64() * 1000.0);

        let missing_chunks: Vec<usize> = files
            .iter()
            .filter(|f| f.state != ChunkState::Done)
            .map(ChunkFile::index)
            .collect();

        let t0 = Instant::now();
        let merged = TranscriptMerger::merge(plan, results);
        logger.timing("merge", t0.elapsed().as_secs_f64() * 1000.0);

        Ok(ParallelOutcome::Completed(Transcription {
            language: language_hint.map(str::to_string).or(merged.language),
            segments: merged.segments,
            chunk_count: plan.len(),
            mode_used: TranscriptionMode::Parallel,
            partial: !missing_chunks.is_empty(),
            missing_chunks,
            chunk_processing_secs: merged.chunk_processing_secs,
            elapsed_secs: 0.0,
        }))
    }

    /// Waits for every chunk in index order, resubmitting failed or late
    /// chunks up to `chunk_retries` times.
    fn collect(
        &self,
        session_id: &SessionId,
        subscription: &mut ResultSubscription,
        files: &mut [ChunkFile],
        language_hint: Option<&str>,
        deadline: Instant,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Collection, TranscribeError> {
        let total = files.len();
        let chunk_timeout = self.config.chunk_timeout();
        let mut results = Vec::with_capacity(total);

        for index in 0..total {
            let mut attempts: u32 = 1;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return self.on_session_timeout(session_id, subscription, files, results);
                }
                let limited_by_session = remaining < chunk_timeout;

                let error = match subscription.await_result(index, chunk_timeout.min(remaining)) {
                    Ok(result) => {
                        files[index].state = ChunkState::Done;
                        results.push(result);
                        logger.progress(results.len(), total);
                        break;
                    }
                    Err(PoolError::ChunkTimeout { .. }) if limited_by_session => {
                        return self.on_session_timeout(session_id, subscription, files, results);
                    }
                    Err(e @ (PoolError::Closed | PoolError::Unavailable)) => {
                        return Ok(Collection::Fallback(e.to_string()));
                    }
                    Err(e) => e,
                };

                files[index].state = ChunkState::Failed;
                if let Some(reason) = self.pool_unusable() {
                    return Ok(Collection::Fallback(format!("{reason} ({error})")));
                }
                if attempts > self.config.chunk_retries {
                    log::error!("Session {session_id}: giving up on chunk {index}: {error}");
                    return Err(TranscribeError::ChunkFailed {
                        chunk_index: index,
                        attempts,
                        source: error,
                    });
                }
                attempts += 1;
                logger.metric("retries", 1.0);
                log::warn!(
                    "Session {session_id}: retrying chunk {index} (attempt {attempts}) after: {error}"
                );
                if let Err(e) = self
                    .pool
                    .submit(chunk_task(session_id, &files[index], language_hint))
                {
                    return Ok(Collection::Fallback(format!("resubmission failed: {e}")));
                }
                files[index].state = ChunkState::Submitted;
            }
        }
        Ok(Collection::Results(results))
    }

    fn on_session_timeout(
        &self,
        session_id: &SessionId,
        subscription: &mut ResultSubscription,
        files: &mut [ChunkFile],
        mut results: Vec<ChunkResult>,
    ) -> Result<Collection, TranscribeError> {
        // Keep whatever already arrived
        for file in files.iter_mut().filter(|f| f.state != ChunkState::Done) {
            if let Some(Ok(result)) = subscription.try_result(file.index()) {
                file.state = ChunkState::Done;
                results.push(result);
            }
        }

        let abandoned = files.len() - results.len();
        log::warn!(
            "Session {session_id} deadline passed; discarding {abandoned} outstanding chunk(s)"
        );
        match self.config.partial_policy {
            PartialPolicy::BestEffort if !results.is_empty() => Ok(Collection::Results(results)),
            _ => Err(TranscribeError::SessionTimeout {
                session_id: session_id.clone(),
                timeout: self.config.session_timeout(),
                completed: results.len(),
                total: files.len(),
            }),
        }
    }
}

fn chunk_task(session_id: &SessionId, file: &ChunkFile, language_hint: Option<&str>) -> Task {
    Task {
        session_id: session_id.clone(),
        chunk_index: file.index(),
        chunk_path: file.path.clone(),
        language_hint: language_hint.map(str::to_string),
    }
}
