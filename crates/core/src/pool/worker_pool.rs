use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::pool::domain::pool_health::{PoolHealth, PoolStats, WorkerState};
use crate::pool::domain::task::{ChunkResult, Task, TaskFailure, TaskOutcome};
use crate::pool::result_subscription::{lock_routes, ResultSubscription, RouteTable};
use crate::session::domain::session::SessionId;
use crate::transcription::domain::speech_model::{
    SpeechModel, SpeechModelLoader, TranscriptionError,
};

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    InvalidWorkerCount,
    #[error("worker pool is shutting down")]
    Closed,
    #[error("worker pool has no live workers")]
    Unavailable,
    #[error("chunk {chunk_index} produced no result within {timeout:?}")]
    ChunkTimeout {
        chunk_index: usize,
        timeout: Duration,
    },
    #[error("worker {worker_id} crashed on chunk {chunk_index}: {message}")]
    WorkerCrashed {
        worker_id: usize,
        chunk_index: usize,
        message: String,
    },
    #[error("chunk {chunk_index} failed: {source}")]
    TaskFailed {
        chunk_index: usize,
        #[source]
        source: TranscriptionError,
    },
    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// Below this many live workers the pool reports `Degraded`.
    /// Defaults to `worker_count`, so losing any worker degrades the pool.
    pub min_healthy_workers: Option<usize>,
    /// Extra load attempts per slot before the slot is given up.
    pub load_retries: u32,
}

impl PoolConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            min_healthy_workers: None,
            load_retries: 2,
        }
    }

    fn min_healthy(&self) -> usize {
        self.min_healthy_workers
            .unwrap_or(self.worker_count)
            .clamp(1, self.worker_count.max(1))
    }
}

/// Result of `WorkerPool::shutdown`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Every worker finished its in-flight task and exited in time.
    pub drained: bool,
    /// Workers still busy when the drain timeout expired.
    pub abandoned_workers: usize,
    /// Queued tasks thrown away because the drain timed out.
    pub discarded_tasks: usize,
}

/// State shared between the pool handle, its workers and the dispatcher.
struct PoolShared {
    slots: Mutex<Vec<WorkerState>>,
    slots_changed: Condvar,
    busy: AtomicUsize,
    peak_busy: AtomicUsize,
    closed: AtomicBool,
    terminate: AtomicBool,
    min_healthy: usize,
    routes: Arc<RouteTable>,
}

impl PoolShared {
    fn slots(&self) -> MutexGuard<'_, Vec<WorkerState>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, worker_id: usize, state: WorkerState) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(worker_id) {
            *slot = state;
        }
        self.slots_changed.notify_all();
    }

    fn effective_workers(&self) -> usize {
        self.slots().iter().filter(|s| s.is_live()).count()
    }

    fn health(&self) -> PoolHealth {
        PoolHealth::assess(
            self.effective_workers(),
            self.min_healthy,
            self.closed.load(Ordering::SeqCst),
        )
    }
}

/// Fixed set of long-lived transcription workers behind one task queue.
///
/// Layout: `submit → [task queue] → worker × N → [result channel] → dispatcher → subscriptions`
///
/// Each worker loads its model exactly once, at startup, and then serves
/// tasks until shutdown. A worker that panics mid-task is marked crashed and
/// not replaced; the pool keeps serving with the remaining workers and the
/// in-flight task is reported back as crashed, never resubmitted.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    task_tx: Mutex<Option<Sender<Task>>>,
    task_rx: Receiver<Task>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    dispatcher: Mutex<Option<thread::JoinHandle<()>>>,
    configured_workers: usize,
}

impl WorkerPool {
    /// Spawns the workers and blocks until every slot has either loaded its
    /// model or exhausted its load retries.
    pub fn start(config: &PoolConfig, loader: Arc<dyn SpeechModelLoader>) -> Result<Self, PoolError> {
        if config.worker_count == 0 {
            return Err(PoolError::InvalidWorkerCount);
        }
        let worker_count = config.worker_count;
        log::info!(
            "Starting worker pool: {worker_count} worker(s), model '{}'",
            loader.name()
        );

        let shared = Arc::new(PoolShared {
            slots: Mutex::new(vec![WorkerState::Loading; worker_count]),
            slots_changed: Condvar::new(),
            busy: AtomicUsize::new(0),
            peak_busy: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
            min_healthy: config.min_healthy(),
            routes: Arc::new(RouteTable::default()),
        });

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<TaskOutcome>();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded::<(usize, bool)>();

        let dispatcher = spawn_dispatcher(result_rx, shared.routes.clone())?;

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = Worker {
                worker_id,
                shared: shared.clone(),
                loader: loader.clone(),
                load_retries: config.load_retries,
                tasks: task_rx.clone(),
                results: result_tx.clone(),
            };
            let ready = ready_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("transcribe-worker-{worker_id}"))
                .spawn(move || worker.run(ready));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn worker {worker_id}: {e}");
                    shared.set_state(worker_id, WorkerState::Failed);
                }
            }
        }
        drop(result_tx);
        drop(ready_tx);

        let mut loaded = 0;
        for (worker_id, ok) in ready_rx.iter() {
            if ok {
                loaded += 1;
            } else {
                log::warn!("Worker {worker_id} gave up loading its model");
            }
        }

        let pool = Self {
            shared,
            task_tx: Mutex::new(Some(task_tx)),
            task_rx,
            workers: Mutex::new(workers),
            dispatcher: Mutex::new(Some(dispatcher)),
            configured_workers: worker_count,
        };

        match pool.health() {
            PoolHealth::Healthy => log::info!("Worker pool ready: {loaded}/{worker_count} workers"),
            PoolHealth::Degraded => log::warn!(
                "Worker pool started degraded: {loaded}/{worker_count} workers loaded"
            ),
            PoolHealth::Unavailable => {
                log::error!("Worker pool has no usable workers; requests will run sequentially")
            }
        }
        Ok(pool)
    }

    /// Enqueues a task without blocking.
    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        if self.shared.effective_workers() == 0 {
            return Err(PoolError::Unavailable);
        }
        let guard = self.task_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| PoolError::Closed),
            None => Err(PoolError::Closed),
        }
    }

    /// Starts routing every outcome for `session_id` to the returned handle.
    ///
    /// Subscribe before submitting, or early outcomes are discarded.
    pub fn subscribe(&self, session_id: &SessionId) -> ResultSubscription {
        ResultSubscription::register(self.shared.routes.clone(), session_id.clone())
    }

    pub fn health(&self) -> PoolHealth {
        self.shared.health()
    }

    pub fn stats(&self) -> PoolStats {
        let worker_states = self.shared.slots().clone();
        PoolStats {
            configured_workers: self.configured_workers,
            effective_workers: worker_states.iter().filter(|s| s.is_live()).count(),
            busy_workers: self.shared.busy.load(Ordering::SeqCst),
            peak_busy_workers: self.shared.peak_busy.load(Ordering::SeqCst),
            queued_tasks: self.task_rx.len(),
            health: self.health(),
            worker_states,
        }
    }

    /// Stops accepting tasks, lets workers finish what is queued for up to
    /// `drain_timeout`, then abandons whatever is left.
    ///
    /// Safe to call more than once; later calls only report.
    pub fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        self.shared.closed.store(true, Ordering::SeqCst);
        let sender = self
            .task_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            log::info!("Shutting down worker pool (drain timeout {drain_timeout:?})");
        }
        // Idle workers see a disconnected queue once it is empty and exit
        drop(sender);

        let deadline = Instant::now() + drain_timeout;
        let mut slots = self.shared.slots();
        loop {
            let live = slots.iter().filter(|s| s.is_live()).count();
            let now = Instant::now();
            if live == 0 || now >= deadline {
                break;
            }
            slots = match self.shared.slots_changed.wait_timeout(slots, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        let abandoned_workers = slots.iter().filter(|s| s.is_live()).count();
        drop(slots);

        let drained = abandoned_workers == 0;
        let mut discarded_tasks = 0;
        if !drained {
            self.shared.terminate.store(true, Ordering::SeqCst);
            discarded_tasks = self.task_rx.try_iter().count();
            log::warn!(
                "Worker pool drain timed out: {abandoned_workers} worker(s) still busy, \
                 {discarded_tasks} queued task(s) discarded"
            );
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
            // Unfinished workers are detached; they exit after their current task
        }
        drop(workers);

        if drained {
            let dispatcher = self
                .dispatcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = dispatcher {
                if handle.join().is_err() {
                    log::error!("Result dispatcher panicked");
                }
            }
        }

        ShutdownReport {
            drained,
            abandoned_workers,
            discarded_tasks,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shared.closed.load(Ordering::SeqCst) {
            self.shutdown(Duration::ZERO);
        }
    }
}

fn spawn_dispatcher(
    results: Receiver<TaskOutcome>,
    routes: Arc<RouteTable>,
) -> Result<thread::JoinHandle<()>, PoolError> {
    thread::Builder::new()
        .name("transcribe-dispatcher".into())
        .spawn(move || {
            for outcome in results {
                let route = lock_routes(&routes).get(&outcome.session_id).cloned();
                let (session_id, chunk_index) = (outcome.session_id.clone(), outcome.chunk_index);
                let delivered = match route {
                    Some(tx) => tx.send(outcome).is_ok(),
                    None => false,
                };
                if !delivered {
                    log::debug!(
                        "Discarding outcome for chunk {chunk_index} of inactive session {session_id}"
                    );
                }
            }
        })
        .map_err(PoolError::Spawn)
}

struct Worker {
    worker_id: usize,
    shared: Arc<PoolShared>,
    loader: Arc<dyn SpeechModelLoader>,
    load_retries: u32,
    tasks: Receiver<Task>,
    results: Sender<TaskOutcome>,
}

impl Worker {
    fn run(self, ready: Sender<(usize, bool)>) {
        let Some(mut model) = self.load_model() else {
            self.shared.set_state(self.worker_id, WorkerState::Failed);
            let _ = ready.send((self.worker_id, false));
            return;
        };
        self.shared.set_state(self.worker_id, WorkerState::Idle);
        let _ = ready.send((self.worker_id, true));
        drop(ready);

        for task in self.tasks.iter() {
            if self.shared.terminate.load(Ordering::SeqCst) {
                log::debug!(
                    "Worker {} dropping chunk {} of session {} on termination",
                    self.worker_id,
                    task.chunk_index,
                    task.session_id
                );
                break;
            }
            if !lock_routes(&self.shared.routes).contains_key(&task.session_id) {
                log::debug!(
                    "Worker {} skipping chunk {} of session {}: nobody is waiting for it",
                    self.worker_id,
                    task.chunk_index,
                    task.session_id
                );
                continue;
            }
            if !self.serve(model.as_mut(), task) {
                return;
            }
        }

        self.shared.set_state(self.worker_id, WorkerState::Stopped);
        log::debug!("Worker {} stopped", self.worker_id);
    }

    fn load_model(&self) -> Option<Box<dyn SpeechModel>> {
        let attempts = self.load_retries + 1;
        for attempt in 1..=attempts {
            let started = Instant::now();
            match panic::catch_unwind(AssertUnwindSafe(|| self.loader.load())) {
                Ok(Ok(model)) => {
                    log::info!(
                        "Worker {} loaded model in {:.1}s",
                        self.worker_id,
                        started.elapsed().as_secs_f64()
                    );
                    return Some(model);
                }
                Ok(Err(e)) => log::warn!(
                    "Worker {} model load attempt {attempt}/{attempts} failed: {e}",
                    self.worker_id
                ),
                Err(payload) => log::warn!(
                    "Worker {} model load attempt {attempt}/{attempts} panicked: {}",
                    self.worker_id,
                    panic_message(payload.as_ref())
                ),
            }
        }
        None
    }

    /// Runs one task. Returns `false` if the worker died doing it.
    fn serve(&self, model: &mut dyn SpeechModel, task: Task) -> bool {
        self.shared.set_state(self.worker_id, WorkerState::Busy);
        let busy_now = self.shared.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_busy.fetch_max(busy_now, Ordering::SeqCst);

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            model.transcribe(&task.chunk_path, task.language_hint.as_deref())
        }));
        let processing_time = started.elapsed();
        self.shared.busy.fetch_sub(1, Ordering::SeqCst);

        let (result, alive) = match outcome {
            Ok(Ok(transcript)) => (
                Ok(ChunkResult {
                    session_id: task.session_id.clone(),
                    chunk_index: task.chunk_index,
                    detected_language: transcript.language,
                    segments: transcript.segments,
                    processing_time,
                    worker_id: self.worker_id,
                }),
                true,
            ),
            Ok(Err(e)) => {
                log::warn!(
                    "Worker {} failed chunk {} of session {}: {e}",
                    self.worker_id,
                    task.chunk_index,
                    task.session_id
                );
                (Err(TaskFailure::Transcription(e)), true)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!(
                    "Worker {} crashed on chunk {} of session {}: {message}",
                    self.worker_id,
                    task.chunk_index,
                    task.session_id
                );
                (
                    Err(TaskFailure::WorkerCrashed {
                        worker_id: self.worker_id,
                        message,
                    }),
                    false,
                )
            }
        };

        // State first, so a receiver of a crash outcome already sees the lost capacity
        let state = if alive {
            WorkerState::Idle
        } else {
            WorkerState::Crashed
        };
        self.shared.set_state(self.worker_id, state);

        let _ = self.results.send(TaskOutcome {
            session_id: task.session_id,
            chunk_index: task.chunk_index,
            result,
        });
        alive
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn start(workers: usize, loader: ScriptedLoader) -> (WorkerPool, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let loads = loader.loads.clone();
        let max_active = loader.max_active.clone();
        let pool = WorkerPool::start(&PoolConfig::new(workers), Arc::new(loader)).unwrap();
        (pool, loads, max_active)
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = WorkerPool::start(
            &PoolConfig::new(0),
            Arc::new(ScriptedLoader::new(Duration::ZERO)),
        );
        assert!(matches!(result, Err(PoolError::InvalidWorkerCount)));
    }

    #[test]
    fn test_start_blocks_until_all_workers_idle() {
        let (pool, loads, _) = start(3, ScriptedLoader::new(Duration::ZERO));
        let stats = pool.stats();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(stats.worker_states, vec![WorkerState::Idle; 3]);
        assert_eq!(stats.health, PoolHealth::Healthy);
    }

    #[test]
    fn test_each_worker_loads_model_exactly_once() {
        let (pool, loads, _) = start(3, ScriptedLoader::new(Duration::from_millis(2)));
        let mut sub = pool.subscribe(&SessionId::from("s"));
        for i in 0..12 {
            pool.submit(task("s", i, &format!("chunk{i}"))).unwrap();
        }
        for i in 0..12 {
            sub.await_result(i, WAIT).unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_results_correlated_by_index_not_arrival() {
        let (pool, _, _) = start(3, ScriptedLoader::new(Duration::from_millis(5)));
        let mut sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "zero-slow")).unwrap();
        pool.submit(task("s", 1, "one")).unwrap();
        pool.submit(task("s", 2, "two")).unwrap();

        let zero = sub.await_result(0, WAIT).unwrap();
        assert_eq!(zero.segments[0].text, "zero-slow-a");
        assert!(!sub.parked().is_empty());
        assert_eq!(sub.await_result(2, WAIT).unwrap().segments[0].text, "two-a");
        assert_eq!(sub.await_result(1, WAIT).unwrap().segments[0].text, "one-a");
    }

    #[test]
    fn test_busy_workers_never_exceed_worker_count_across_sessions() {
        let (pool, _, max_active) = start(2, ScriptedLoader::new(Duration::from_millis(5)));
        let pool = Arc::new(pool);

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|session| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut sub = pool.subscribe(&SessionId::from(session));
                    for i in 0..6 {
                        pool.submit(task(session, i, &format!("{session}{i}"))).unwrap();
                    }
                    (0..6)
                        .map(|i| sub.await_result(i, WAIT).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (handle, session) in handles.into_iter().zip(["a", "b"]) {
            for result in handle.join().unwrap() {
                assert_eq!(result.session_id, SessionId::from(session));
                assert!(result.segments[0].text.starts_with(session));
            }
        }
        assert!(pool.stats().peak_busy_workers <= 2);
        assert!(max_active.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_worker_crash_degrades_pool_but_keeps_serving() {
        let (pool, _, _) = start(4, ScriptedLoader::new(Duration::from_millis(1)));
        let mut sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "panic")).unwrap();

        let err = sub.await_result(0, WAIT).unwrap_err();
        assert!(matches!(err, PoolError::WorkerCrashed { chunk_index: 0, .. }));

        let stats = pool.stats();
        assert_eq!(stats.effective_workers, 3);
        assert_eq!(stats.health, PoolHealth::Degraded);
        assert_eq!(
            stats.worker_states.iter().filter(|s| **s == WorkerState::Crashed).count(),
            1
        );

        pool.submit(task("s", 1, "after")).unwrap();
        assert!(sub.await_result(1, WAIT).is_ok());
    }

    #[test]
    fn test_crash_within_tolerance_stays_healthy() {
        let config = PoolConfig {
            worker_count: 4,
            min_healthy_workers: Some(3),
            load_retries: 0,
        };
        let pool =
            WorkerPool::start(&config, Arc::new(ScriptedLoader::new(Duration::ZERO))).unwrap();
        let mut sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "panic")).unwrap();
        let _ = sub.await_result(0, WAIT);
        assert_eq!(pool.health(), PoolHealth::Healthy);
    }

    #[test]
    fn test_task_error_keeps_worker_alive() {
        let (pool, _, _) = start(1, ScriptedLoader::new(Duration::ZERO));
        let mut sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "fail")).unwrap();
        let err = sub.await_result(0, WAIT).unwrap_err();
        assert!(matches!(err, PoolError::TaskFailed { chunk_index: 0, .. }));
        assert_eq!(pool.health(), PoolHealth::Healthy);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let config = PoolConfig {
            worker_count: 2,
            min_healthy_workers: None,
            load_retries: 1,
        };
        let loader = ScriptedLoader::new(Duration::ZERO).failing_first(1);
        let loads = loader.loads.clone();
        let pool = WorkerPool::start(&config, Arc::new(loader)).unwrap();
        assert_eq!(pool.health(), PoolHealth::Healthy);
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_load_retries_start_degraded() {
        let config = PoolConfig {
            worker_count: 4,
            min_healthy_workers: None,
            load_retries: 0,
        };
        let pool = WorkerPool::start(
            &config,
            Arc::new(ScriptedLoader::new(Duration::ZERO).failing_first(1)),
        )
        .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.effective_workers, 3);
        assert_eq!(stats.health, PoolHealth::Degraded);
    }

    #[test]
    fn test_no_loaded_workers_is_unavailable() {
        let config = PoolConfig {
            worker_count: 2,
            min_healthy_workers: None,
            load_retries: 1,
        };
        let pool = WorkerPool::start(
            &config,
            Arc::new(ScriptedLoader::new(Duration::ZERO).failing_first(100)),
        )
        .unwrap();
        assert_eq!(pool.health(), PoolHealth::Unavailable);
        let result = pool.submit(task("s", 0, "x"));
        assert!(matches!(result, Err(PoolError::Unavailable)));
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let (pool, _, _) = start(1, ScriptedLoader::new(Duration::ZERO));
        let report = pool.shutdown(WAIT);
        assert!(report.drained);
        assert!(matches!(pool.submit(task("s", 0, "x")), Err(PoolError::Closed)));
        assert_eq!(pool.health(), PoolHealth::Unavailable);
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let (pool, _, _) = start(2, ScriptedLoader::new(Duration::from_millis(10)));
        let mut sub = pool.subscribe(&SessionId::from("s"));
        for i in 0..6 {
            pool.submit(task("s", i, &format!("c{i}"))).unwrap();
        }
        let report = pool.shutdown(WAIT);
        assert!(report.drained);
        assert_eq!(report.discarded_tasks, 0);
        for i in 0..6 {
            assert!(sub.await_result(i, Duration::from_millis(100)).is_ok());
        }
        assert!(pool
            .stats()
            .worker_states
            .iter()
            .all(|s| *s == WorkerState::Stopped));
    }

    #[test]
    fn test_shutdown_timeout_abandons_remaining_work() {
        let (pool, _, _) = start(1, ScriptedLoader::new(Duration::from_millis(50)));
        let _sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "first-slow")).unwrap();
        pool.submit(task("s", 1, "queued")).unwrap();
        thread::sleep(Duration::from_millis(20));

        let report = pool.shutdown(Duration::from_millis(10));
        assert!(!report.drained);
        assert_eq!(report.abandoned_workers, 1);
        assert_eq!(report.discarded_tasks, 1);
    }

    #[test]
    fn test_outcomes_for_unsubscribed_session_are_discarded() {
        let (pool, _, _) = start(1, ScriptedLoader::new(Duration::ZERO));
        let mut mine = pool.subscribe(&SessionId::from("mine"));
        pool.submit(task("other", 0, "theirs")).unwrap();
        pool.submit(task("mine", 0, "ours")).unwrap();
        let result = mine.await_result(0, WAIT).unwrap();
        assert_eq!(result.segments[0].text, "ours-a");
        assert!(mine.parked().is_empty());
    }

    #[test]
    fn test_tasks_of_abandoned_sessions_are_skipped() {
        let (pool, _, _) = start(1, ScriptedLoader::new(Duration::ZERO));
        // Would crash the only worker if it were run
        pool.submit(task("gone", 0, "panic")).unwrap();
        let mut sub = pool.subscribe(&SessionId::from("s"));
        pool.submit(task("s", 0, "after")).unwrap();

        let result = sub.await_result(0, WAIT).unwrap();
        assert_eq!(result.segments[0].text, "after-a");
        assert_eq!(pool.health(), PoolHealth::Healthy);
        assert_eq!(pool.stats().effective_workers, 1);
    }
}
