use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::session::domain::session::{
    unix_now, AreaKind, Session, SessionId, SessionMetadata, SessionState,
};
use crate::session::domain::storage::SessionStorage;
use crate::session::infrastructure::local_storage::LocalStorage;

pub const METADATA_FILE_NAME: &str = "session.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("session storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode session metadata: {0}")]
    Metadata(#[source] serde_json::Error),
}

/// Outcome of one abandoned-session sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub closed: Vec<SessionId>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Creates, tracks and destroys per-request working areas under one root.
///
/// Every session gets its own directory named after its id, so two requests
/// never share a path.
pub struct SessionStore {
    root: PathBuf,
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            root: root.into(),
            storage,
        }
    }

    /// A store backed by the local filesystem.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(root, Arc::new(LocalStorage))
    }

    /// Platform cache location used when no session root is configured.
    pub fn default_root() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("longscribe").join("sessions"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn open(&self, requester: &str, descriptor: &str) -> Result<Session, StorageError> {
        let id = SessionId::generate(requester);
        let session_root = self.root.join(id.as_str());
        let metadata = SessionMetadata {
            id,
            requester: requester.to_string(),
            descriptor: descriptor.to_string(),
            created_at: unix_now(),
            state: SessionState::Active,
        };
        let session = Session::new(session_root, metadata);

        if let Err(e) = self.materialize(&session) {
            let _ = self.storage.remove_dir_all(session.root());
            return Err(e);
        }

        log::debug!("Opened session {} at {}", session.id(), session.root().display());
        Ok(session)
    }

    fn materialize(&self, session: &Session) -> Result<(), StorageError> {
        for kind in AreaKind::ALL {
            let path = session.area(*kind);
            self.storage
                .create_dir_all(&path)
                .map_err(|source| StorageError::Unavailable { path, source })?;
        }
        self.persist_metadata(session)
    }

    fn persist_metadata(&self, session: &Session) -> Result<(), StorageError> {
        let json =
            serde_json::to_vec_pretty(session.metadata()).map_err(StorageError::Metadata)?;
        let path = session.root().join(METADATA_FILE_NAME);
        self.storage
            .write(&path, &json)
            .map_err(|source| StorageError::Unavailable { path, source })
    }

    pub fn area(&self, session: &Session, kind: AreaKind) -> PathBuf {
        session.area(kind)
    }

    /// Recursively deletes the session's storage. Safe to call repeatedly.
    pub fn close(&self, session: &mut Session) -> Result<(), StorageError> {
        if session.state() == SessionState::Destroyed {
            return Ok(());
        }

        session.set_state(SessionState::Finalizing);
        if self.storage.exists(session.root()) {
            if let Err(e) = self.persist_metadata(session) {
                log::debug!("Could not mark session {} finalizing: {e}", session.id());
            }
        }

        self.storage
            .remove_dir_all(session.root())
            .map_err(|source| StorageError::Unavailable {
                path: session.root().to_path_buf(),
                source,
            })?;

        session.set_state(SessionState::Destroyed);
        log::debug!("Closed session {}", session.id());
        Ok(())
    }

    /// Wraps `session` so it is closed when the guard goes out of scope.
    pub fn guard(&self, session: Session) -> SessionGuard<'_> {
        SessionGuard {
            store: self,
            session,
        }
    }

    /// Closes sessions left behind by crashed or timed-out requests.
    ///
    /// Individual failures are collected in the report and logged, never
    /// propagated.
    pub fn sweep(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let entries = match self.storage.list_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                log::warn!("Session sweep could not list {}: {e}", self.root.display());
                report.failures.push((self.root.clone(), e.to_string()));
                return report;
            }
        };

        let now = unix_now();
        for dir in entries {
            report.scanned += 1;
            let metadata = match self.read_metadata(&dir) {
                Ok(m) => m,
                Err(reason) => {
                    report.failures.push((dir, reason));
                    continue;
                }
            };
            if metadata.state == SessionState::Destroyed
                || metadata.age_secs(now) < max_age.as_secs()
            {
                continue;
            }
            let id = metadata.id.clone();
            let mut session = Session::new(dir.clone(), metadata);
            match self.close(&mut session) {
                Ok(()) => report.closed.push(id),
                Err(e) => report.failures.push((dir, e.to_string())),
            }
        }

        for (path, reason) in &report.failures {
            log::warn!("Session sweep failed for {}: {reason}", path.display());
        }
        if !report.closed.is_empty() {
            log::info!("Session sweep removed {} abandoned session(s)", report.closed.len());
        }
        report
    }

    fn read_metadata(&self, dir: &Path) -> Result<SessionMetadata, String> {
        let bytes = self
            .storage
            .read(&dir.join(METADATA_FILE_NAME))
            .map_err(|e| format!("unreadable metadata: {e}"))?;
        serde_json::from_slice(&bytes).map_err(|e| format!("corrupt metadata: {e}"))
    }
}

/// Closes its session on drop, covering success, error and unwinding paths.
pub struct SessionGuard<'a> {
    store: &'a SessionStore,
    session: Session,
}

impl SessionGuard<'_> {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Deref for SessionGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.close(&mut self.session) {
            log::error!("Failed to clean up session {}: {e}", self.session.id());
        }
    }
}
