//! Error types for permgraph.
//!
//! Query errors (`GroupNotFound`, `UserNotFound`) are ordinary results the
//! caller is expected to handle. Rebuild and dataset errors are fatal: the
//! refresh scheduler hands them to its host, which is expected to exit.

use std::time::Duration;

use thiserror::Error;

use crate::graph::Checkpoint;

/// Errors raised by a storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset: {0}")]
    Malformed(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Malformed(e.to_string())
    }
}

/// Errors returned by the graph cache, its queries and its scheduler.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("graph rebuild failed: {0}")]
    RebuildFailed(#[source] StorageError),

    #[error("graph rebuild exceeded {0:?}")]
    RebuildTimedOut(Duration),

    #[error("dataset changed from {expected:?} to {found:?} while running")]
    DatasetChanged { expected: String, found: String },

    #[error("storage checkpoint went back from {installed} to {found}")]
    CheckpointRegressed {
        found: Checkpoint,
        installed: Checkpoint,
    },

    #[error("refresh scheduler stopped: {0}")]
    SchedulerStopped(String),

    #[error("snapshot at checkpoint {offered} is older than installed checkpoint {installed}")]
    StaleSnapshot {
        offered: Checkpoint,
        installed: Checkpoint,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Whether the hosting process should stop serving after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GraphError::RebuildFailed(_)
                | GraphError::RebuildTimedOut(_)
                | GraphError::DatasetChanged { .. }
                | GraphError::CheckpointRegressed { .. }
                | GraphError::SchedulerStopped(_)
        )
    }

    /// Whether this is a recoverable "not found" answer to a query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::GroupNotFound(_) | GraphError::UserNotFound(_))
    }
}

/// Result type alias for permgraph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GraphError::RebuildFailed(StorageError::Unavailable("down".into())).is_fatal());
        assert!(GraphError::DatasetChanged {
            expected: "a".into(),
            found: "b".into()
        }
        .is_fatal());
        assert!(GraphError::RebuildTimedOut(Duration::from_secs(1)).is_fatal());
        assert!(GraphError::CheckpointRegressed {
            found: Checkpoint::new(1, 0),
            installed: Checkpoint::new(2, 0),
        }
        .is_fatal());
        assert!(GraphError::SchedulerStopped("gone".into()).is_fatal());
        assert!(!GraphError::StaleSnapshot {
            offered: Checkpoint::new(1, 0),
            installed: Checkpoint::new(2, 0),
        }
        .is_fatal());
        assert!(!GraphError::GroupNotFound("g".into()).is_fatal());
        assert!(GraphError::UserNotFound("u".into()).is_not_found());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: StorageError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StorageError::Malformed(_)));
    }
}
