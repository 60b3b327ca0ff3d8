//! Checkpoint reader.

use crate::storage::{GraphStorage, StorageResult};

use super::types::Checkpoint;

/// Read the dataset checkpoint. An empty database reads as `(0, 0)`.
pub fn read_checkpoint(storage: &dyn GraphStorage) -> StorageResult<Checkpoint> {
    Ok(match storage.counter()? {
        Some(row) => Checkpoint::new(row.count, row.last_modified.timestamp()),
        None => Checkpoint::default(),
    })
}
