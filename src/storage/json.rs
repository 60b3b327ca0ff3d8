//! Storage backed by a JSON dump of the dataset.
//!
//! The file is parsed when the identity or the counter is read. Data queries
//! answer from that parse, so a build that reads the counter first sees one
//! dump throughout even if a writer replaces the file mid-build.

use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{CounterRow, Dataset, GraphStorage, StorageResult};
use crate::graph::{
    GroupMetadata, GroupRecord, MembershipEdge, Node, PermissionGrant, PermissionRecord,
    UserRecord,
};

pub struct JsonFileStorage {
    path: PathBuf,
    /// Dump parsed by the last identity or counter read.
    loaded: RwLock<Option<Arc<Dataset>>>,
}

impl JsonFileStorage {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            loaded: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `dataset` to `path`, replacing any existing file.
    pub fn write(path: impl AsRef<Path>, dataset: &Dataset) -> StorageResult<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(dataset)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Parse the file and make it the dump data queries answer from.
    fn reload(&self) -> StorageResult<Arc<Dataset>> {
        let bytes = fs::read(&self.path)?;
        let dataset: Arc<Dataset> = Arc::new(serde_json::from_slice(&bytes)?);
        debug!(path = %self.path.display(), bytes = bytes.len(), "loaded dataset");
        *self.loaded.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    fn load(&self) -> StorageResult<Arc<Dataset>> {
        let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner()).clone();
        match loaded {
            Some(dataset) => Ok(dataset),
            None => self.reload(),
        }
    }
}

impl GraphStorage for JsonFileStorage {
    fn dataset_identity(&self) -> StorageResult<String> {
        Ok(self.reload()?.name.clone())
    }

    fn counter(&self) -> StorageResult<Option<CounterRow>> {
        Ok(self.reload()?.counter)
    }

    fn list_nodes(&self) -> StorageResult<Vec<Node>> {
        Ok(self.load()?.nodes())
    }

    fn list_edges(&self) -> StorageResult<Vec<MembershipEdge>> {
        Ok(self.load()?.edges(Utc::now()))
    }

    fn permission_grants_by_group(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>> {
        Ok(self.load()?.group_grants())
    }

    fn service_account_grants(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>> {
        Ok(self.load()?.service_account_grants())
    }

    fn user_metadata(&self) -> StorageResult<HashMap<String, UserRecord>> {
        Ok(self.load()?.user_metadata())
    }

    fn group_metadata(&self) -> StorageResult<HashMap<String, GroupMetadata>> {
        Ok(self.load()?.group_metadata())
    }

    fn group_summaries(&self, enabled: bool) -> StorageResult<Vec<GroupRecord>> {
        Ok(self.load()?.group_summaries(enabled))
    }

    fn permission_summaries(&self) -> StorageResult<Vec<PermissionRecord>> {
        Ok(self.load()?.permission_summaries())
    }
}
