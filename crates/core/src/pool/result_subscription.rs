use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::pool::domain::task::{ChunkResult, TaskFailure, TaskOutcome};
use crate::pool::worker_pool::PoolError;
use crate::session::domain::session::SessionId;

/// Session id → channel feeding that session's subscription.
pub(crate) type RouteTable = Mutex<HashMap<SessionId, Sender<TaskOutcome>>>;

pub(crate) fn lock_routes(routes: &RouteTable) -> MutexGuard<'_, HashMap<SessionId, Sender<TaskOutcome>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives every outcome the pool produces for one session.
///
/// Outcomes arrive in completion order; `await_result` matches them to the
/// requested chunk index and parks the others until asked for. The route is
/// removed when the subscription is dropped, after which late outcomes for
/// the session are discarded by the pool.
pub struct ResultSubscription {
    session_id: SessionId,
    rx: Receiver<TaskOutcome>,
    pending: HashMap<usize, TaskOutcome>,
    delivered: HashSet<usize>,
    routes: Arc<RouteTable>,
}

impl ResultSubscription {
    pub(crate) fn register(routes: Arc<RouteTable>, session_id: SessionId) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock_routes(&routes).insert(session_id.clone(), tx);
        Self {
            session_id,
            rx,
            pending: HashMap::new(),
            delivered: HashSet::new(),
            routes,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Blocks until the outcome for `chunk_index` arrives or `timeout` elapses.
    pub fn await_result(
        &mut self,
        chunk_index: usize,
        timeout: Duration,
    ) -> Result<ChunkResult, PoolError> {
        if let Some(outcome) = self.pending.remove(&chunk_index) {
            return self.settle(outcome);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) if outcome.chunk_index == chunk_index => {
                    return self.settle(outcome);
                }
                Ok(outcome) => self.park(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(PoolError::ChunkTimeout {
                        chunk_index,
                        timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(PoolError::Closed),
            }
        }
    }

    /// Returns the outcome for `chunk_index` if it has already arrived.
    pub fn try_result(&mut self, chunk_index: usize) -> Option<Result<ChunkResult, PoolError>> {
        while let Ok(outcome) = self.rx.try_recv() {
            self.park(outcome);
        }
        self.pending
            .remove(&chunk_index)
            .map(|outcome| self.settle(outcome))
    }

    /// Chunk indices whose outcome has arrived but was not asked for yet.
    pub fn parked(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.pending.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    fn park(&mut self, outcome: TaskOutcome) {
        if self.delivered.contains(&outcome.chunk_index) {
            log::debug!(
                "Dropping duplicate outcome for chunk {} of session {}",
                outcome.chunk_index,
                self.session_id
            );
            return;
        }
        // A success beats an earlier failure for the same chunk (retries)
        let replace = match self.pending.get(&outcome.chunk_index) {
            Some(existing) => existing.result.is_err() && outcome.result.is_ok(),
            None => true,
        };
        if replace {
            self.pending.insert(outcome.chunk_index, outcome);
        }
    }

    fn settle(&mut self, outcome: TaskOutcome) -> Result<ChunkResult, PoolError> {
        let chunk_index = outcome.chunk_index;
        match outcome.result {
            Ok(result) => {
                self.delivered.insert(chunk_index);
                Ok(result)
            }
            Err(TaskFailure::Transcription(source)) => Err(PoolError::TaskFailed {
                chunk_index,
                source,
            }),
            Err(TaskFailure::WorkerCrashed { worker_id, message }) => {
                Err(PoolError::WorkerCrashed {
                    worker_id,
                    chunk_index,
                    message,
                })
            }
        }
    }
}

impl Drop for ResultSubscription {
    fn drop(&mut self) {
        lock_routes(&self.routes).remove(&self.session_id);
        let abandoned = self.pending.len() + self.rx.len();
        if abandoned > 0 {
            log::debug!(
                "Discarded {abandoned} undelivered outcome(s) for session {}",
                self.session_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::domain::speech_model::TranscriptionError;

    fn ok(session: &str, index: usize, text: &str) -> TaskOutcome {
        TaskOutcome {
            session_id: SessionId::from(session),
            chunk_index: index,
            result: Ok(ChunkResult {
                session_id: SessionId::from(session),
                chunk_index: index,
                detected_language: Some("en".into()),
                segments: vec![crate::transcription::domain::transcript::Segment::new(
                    text, 0.0, 1.0,
                )],
                processing_time: Duration::from_millis(5),
                worker_id: 0,
            }),
        }
    }

    fn failed(session: &str, index: usize) -> TaskOutcome {
        TaskOutcome {
            session_id: SessionId::from(session),
            chunk_index: index,
            result: Err(TaskFailure::Transcription(TranscriptionError::Inference(
                "boom".into(),
            ))),
        }
    }

    fn route(routes: &Arc<RouteTable>, session: &str) -> Sender<TaskOutcome> {
        lock_routes(routes)
            .get(&SessionId::from(session))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_out_of_order_arrivals_are_matched_by_index() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        let tx = route(&routes, "s");
        tx.send(ok("s", 2, "two")).unwrap();
        tx.send(ok("s", 0, "zero")).unwrap();
        tx.send(ok("s", 1, "one")).unwrap();

        for (index, text) in [(0, "zero"), (1, "one"), (2, "two")] {
            let result = sub.await_result(index, Duration::from_secs(1)).unwrap();
            assert_eq!(result.chunk_index, index);
            assert_eq!(result.segments[0].text, text);
        }
    }

    #[test]
    fn test_timeout_when_chunk_never_arrives() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        route(&routes, "s").send(ok("s", 1, "one")).unwrap();

        let err = sub.await_result(0, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, PoolError::ChunkTimeout { chunk_index: 0, .. }));
        assert_eq!(sub.parked(), vec![1]);
    }

    #[test]
    fn test_duplicate_after_delivery_is_dropped() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        let tx = route(&routes, "s");
        tx.send(ok("s", 0, "first")).unwrap();
        sub.await_result(0, Duration::from_secs(1)).unwrap();

        tx.send(ok("s", 0, "late retry")).unwrap();
        tx.send(ok("s", 1, "one")).unwrap();
        sub.await_result(1, Duration::from_secs(1)).unwrap();
        assert!(sub.parked().is_empty());
    }

    #[test]
    fn test_parked_success_replaces_parked_failure() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        let tx = route(&routes, "s");
        tx.send(failed("s", 1)).unwrap();
        tx.send(ok("s", 1, "retry")).unwrap();
        tx.send(ok("s", 0, "zero")).unwrap();

        sub.await_result(0, Duration::from_secs(1)).unwrap();
        let result = sub.await_result(1, Duration::from_secs(1)).unwrap();
        assert_eq!(result.segments[0].text, "retry");
    }

    #[test]
    fn test_failure_is_reported_as_task_failed() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        route(&routes, "s").send(failed("s", 0)).unwrap();
        let err = sub.await_result(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PoolError::TaskFailed { chunk_index: 0, .. }));
    }

    #[test]
    fn test_try_result_does_not_block() {
        let routes = Arc::new(RouteTable::default());
        let mut sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        assert!(sub.try_result(0).is_none());

        route(&routes, "s").send(ok("s", 0, "zero")).unwrap();
        let result = sub.try_result(0).unwrap().unwrap();
        assert_eq!(result.segments[0].text, "zero");
        assert!(sub.try_result(0).is_none());
    }

    #[test]
    fn test_drop_unregisters_route() {
        let routes = Arc::new(RouteTable::default());
        let sub = ResultSubscription::register(routes.clone(), SessionId::from("s"));
        assert_eq!(lock_routes(&routes).len(), 1);
        drop(sub);
        assert!(lock_routes(&routes).is_empty());
    }
}
