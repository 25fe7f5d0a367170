use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque, unique identifier of one transcription request's working area.
///
/// Built from the creation time, random bits and a hash of the caller's
/// fingerprint, so ids sort roughly by age and never collide across callers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate(requester: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let random = uuid::Uuid::new_v4().simple().to_string();
        let mut hasher = DefaultHasher::new();
        requester.hash(&mut hasher);
        let fingerprint = hasher.finish() as u32;
        Self(format!("{millis:012x}-{}-{fingerprint:08x}", &random[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Finalizing,
    Destroyed,
}

/// Named sub-areas of a session's working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    Source,
    Chunks,
    Results,
}

impl AreaKind {
    pub const ALL: &[AreaKind] = &[AreaKind::Source, AreaKind::Chunks, AreaKind::Results];

    pub fn dir_name(self) -> &'static str {
        match self {
            AreaKind::Source => "source",
            AreaKind::Chunks => "chunks",
            AreaKind::Results => "results",
        }
    }
}

/// Persisted alongside the session directories as `session.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: SessionId,
    pub requester: String,
    /// Free-form description of what the request was for (usually the source path).
    pub descriptor: String,
    /// Unix seconds.
    pub created_at: u64,
    pub state: SessionState,
}

impl SessionMetadata {
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// An isolated working area owned by exactly one in-flight request.
#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    metadata: SessionMetadata,
}

impl Session {
    pub fn new(root: PathBuf, metadata: SessionMetadata) -> Self {
        Self { root, metadata }
    }

    pub fn id(&self) -> &SessionId {
        &self.metadata.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> SessionState {
        self.metadata.state
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.metadata.state = state;
    }

    pub fn area(&self, kind: AreaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
