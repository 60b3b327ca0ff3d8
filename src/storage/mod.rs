//! Storage collaborator interface.
//!
//! The cache never writes to storage. A rebuild issues the read-only queries
//! below and turns the rows into a snapshot. Implementations are expected to
//! apply the row filtering themselves: only enabled users, groups and
//! permissions, and only active, non-expired memberships.

pub mod dataset;
pub mod json;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StorageError;
use crate::graph::{
    GroupMetadata, GroupRecord, MembershipEdge, Node, PermissionGrant, PermissionRecord,
    UserRecord,
};

pub use dataset::Dataset;
pub use json::JsonFileStorage;
pub use memory::MemoryStorage;

/// Result type for storage queries.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The `updates` counter row, bumped by every mutating transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    pub count: i64,
    pub last_modified: DateTime<Utc>,
}

/// Read-only queries the snapshot builder needs from the backing store.
pub trait GraphStorage: Send + Sync {
    /// Identity of the dataset this storage is pointed at.
    fn dataset_identity(&self) -> StorageResult<String>;

    /// The checkpoint counter row, or `None` on an empty database.
    fn counter(&self) -> StorageResult<Option<CounterRow>>;

    /// All enabled users and groups.
    fn list_nodes(&self) -> StorageResult<Vec<Node>>;

    /// All active, non-expired memberships between enabled entities.
    fn list_edges(&self) -> StorageResult<Vec<MembershipEdge>>;

    /// Grants of enabled permissions, keyed by group name.
    fn permission_grants_by_group(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>>;

    /// Grants of enabled permissions, keyed by service account name.
    fn service_account_grants(&self) -> StorageResult<HashMap<String, Vec<PermissionGrant>>>;

    /// Metadata for every enabled user.
    fn user_metadata(&self) -> StorageResult<HashMap<String, UserRecord>>;

    /// Metadata for every enabled group.
    fn group_metadata(&self) -> StorageResult<HashMap<String, GroupMetadata>>;

    /// Flat group summaries, either the enabled or the disabled ones.
    fn group_summaries(&self, enabled: bool) -> StorageResult<Vec<GroupRecord>>;

    /// Flat summaries of enabled permissions.
    fn permission_summaries(&self) -> StorageResult<Vec<PermissionRecord>>;
}
