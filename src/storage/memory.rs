//! In-memory storage backed by a `Dataset`.
//!
//! Used by the test suites and by embedders that keep their own copy of the
//! tables. Every mutation through [`MemoryStorage::update`] bumps the
//! `updates` counter, the same way a write transaction would.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{CounterRow, Dataset, GraphStorage, StorageResult};
use crate::error::StorageError;
use crate::graph::{
    GroupMetadata, GroupRecord, MembershipEdge, Node, PermissionGrant, PermissionRecord,
    UserRecord,
};

pub struct MemoryStorage {
    dataset: RwLock<Dataset>,
    identity: RwLock<String>,
    unavailable: AtomicBool,
    /// Data queries served, not counting the checkpoint and identity reads.
    queries: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(dataset: Dataset) -> Self {
        let identity = dataset.name.clone();
        Self {
            dataset: RwLock::new(dataset),
            identity: RwLock::new(identity),
            unavailable: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    /// Apply a mutation and bump the counter.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Dataset),
    {
        let mut dataset = self.dataset.write().unwrap_or_else(|e| e.into_inner());
        f(&mut dataset);
        dataset.bump_counter(Utc::now());
    }

    /// Apply a mutation without touching the counter.
    pub fn update_silently<F>(&self, f: F)
    where
        F: FnOnce(&mut Dataset),
    {
        let mut dataset = self.dataset.write().unwrap_or_else(|e| e.into_inner());
        f(&mut dataset);
    }

    /// Make every query fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Point the storage at a different dataset identity.
    pub fn set_identity(&self, identity: impl Into<String>) {
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = identity.into();
    }

    /// Number of data queries served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage switched off".into()));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Dataset) -> T) -> StorageResult<T> {
        self.check()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        let dataset = self.dataset.read().unwrap_or_else(|e| e.into_inner());
        Ok(f(&dataset))
    }
}

impl GraphStorage for MemoryStorage {
    fn dataset_identity(&self) -> StorageResult<String> {
        self.check()?;
        Ok(self.identity.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn counter(&self) -> StorageResult<Option<CounterRow>> {
        self.check()?;
        Ok(self.dataset.read().unwrap_or_else(|e| e.into_inner()).counter)
    }

    fn list_nodes(&self) -> StorageResult<Vec<Node>> {
        self.read(|d| d.nodes())
    }

    fn list_edges(&self) -> StorageResult<Vec<MembershipEdge>> {
        self.read(|d| d.edges(Utc::now()))
    }

    fn permission_grants_by_group(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>> {
        self.read(|d| d.group_grants())
    }

    fn service_account_grants(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>> {
        self.read(|d| d.service_account_grants())
    }

    fn user_metadata(&self) -> StorageResult<HashMap<String, UserRecord>> {
        self.read(|d| d.user_metadata())
    }

    fn group_metadata(&self) -> StorageResult<HashMap<String, GroupMetadata>> {
        self.read(|d| d.group_metadata())
    }

    fn group_summaries(&self, enabled: bool) -> StorageResult<Vec<GroupRecord>> {
        self.read(|d| d.group_summaries(enabled))
    }

    fn permission_summaries(&self) -> StorageResult<Vec<PermissionRecord>> {
        self.read(|d| d.permission_summaries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Role;

    #[test]
    fn test_update_bumps_counter() {
        let storage = MemoryStorage::new(Dataset::new("db"));
        assert!(storage.counter().unwrap().is_none());
        storage.update(|d| d.add_member("g", &Node::user("a"), Role::Member));
        storage.update(|d| {
            d.add_group("h");
        });
        assert_eq!(storage.counter().unwrap().unwrap().count, 2);
    }

    #[test]
    fn test_update_silently_keeps_counter() {
        let storage = MemoryStorage::new(Dataset::new("db"));
        storage.update_silently(|d| {
            d.add_group("g");
        });
        assert!(storage.counter().unwrap().is_none());
        assert_eq!(storage.list_nodes().unwrap(), vec![Node::group("g")]);
    }

    #[test]
    fn test_unavailable_fails_every_query() {
        let storage = MemoryStorage::new(Dataset::new("db"));
        storage.set_unavailable(true);
        assert!(storage.counter().is_err());
        assert!(storage.list_nodes().is_err());
        assert!(storage.dataset_identity().is_err());
        assert_eq!(storage.queries(), 0);
    }

    #[test]
    fn test_query_counter_ignores_checkpoint_reads() {
        let storage = MemoryStorage::new(Dataset::new("db"));
        storage.counter().unwrap();
        storage.dataset_identity().unwrap();
        assert_eq!(storage.queries(), 0);
        storage.list_edges().unwrap();
        assert_eq!(storage.queries(), 1);
    }

    #[test]
    fn test_set_identity() {
        let storage = MemoryStorage::new(Dataset::new("db"));
        assert_eq!(storage.dataset_identity().unwrap(), "db");
        storage.set_identity("other");
        assert_eq!(storage.dataset_identity().unwrap(), "other");
    }
}
