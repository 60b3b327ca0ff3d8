//! Immutable snapshot of the permission graph.
//!
//! A snapshot is built whole by [`build_snapshot`](super::build_snapshot),
//! published once through the cache and then shared read-only behind an
//! `Arc`. Nothing in here is ever mutated after construction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::engine::MembershipGraph;
use super::types::{
    Checkpoint, GroupMetadata, GroupRecord, Node, PermissionGrant, PermissionRecord, UserRecord,
};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) graph: MembershipGraph,
    pub(crate) users: BTreeSet<String>,
    pub(crate) groups: BTreeSet<String>,
    pub(crate) grants_by_group: HashMap<String, Vec<PermissionGrant>>,
    pub(crate) service_account_grants: HashMap<String, Vec<PermissionGrant>>,
    pub(crate) user_metadata: HashMap<String, UserRecord>,
    pub(crate) group_metadata: HashMap<String, GroupMetadata>,
    pub(crate) enabled_groups: Vec<GroupRecord>,
    pub(crate) disabled_groups: Vec<GroupRecord>,
    pub(crate) permissions: Vec<PermissionRecord>,
    pub(crate) checkpoint: Checkpoint,
    pub(crate) built_at: DateTime<Utc>,
}

/// Size summary of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub users: usize,
    pub groups: usize,
    pub edges: usize,
    pub group_grants: usize,
    pub service_account_grants: usize,
    pub permissions: usize,
    pub disabled_groups: usize,
    pub checkpoint: Checkpoint,
}

impl Snapshot {
    /// The snapshot a cache starts from before its first build.
    pub fn empty() -> Self {
        Self {
            graph: MembershipGraph::new(),
            users: BTreeSet::new(),
            groups: BTreeSet::new(),
            grants_by_group: HashMap::new(),
            service_account_grants: HashMap::new(),
            user_metadata: HashMap::new(),
            group_metadata: HashMap::new(),
            enabled_groups: Vec::new(),
            disabled_groups: Vec::new(),
            permissions: Vec::new(),
            checkpoint: Checkpoint::default(),
            built_at: Utc::now(),
        }
    }

    pub fn graph(&self) -> &MembershipGraph {
        &self.graph
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.graph.contains(node)
    }

    /// Enabled user names, sorted.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    /// Enabled group names, sorted.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Direct grants of a group, alias grants included.
    pub fn group_grants(&self, group: &str) -> &[PermissionGrant] {
        self.grants_by_group.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups_with_grants(&self) -> impl Iterator<Item = (&str, &[PermissionGrant])> {
        self.grants_by_group
            .iter()
            .map(|(group, grants)| (group.as_str(), grants.as_slice()))
    }

    pub fn service_account_grants(&self, account: &str) -> &[PermissionGrant] {
        self.service_account_grants
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn service_accounts_with_grants(
        &self,
    ) -> impl Iterator<Item = (&str, &[PermissionGrant])> {
        self.service_account_grants
            .iter()
            .map(|(account, grants)| (account.as_str(), grants.as_slice()))
    }

    pub fn user_metadata(&self, name: &str) -> Option<&UserRecord> {
        self.user_metadata.get(name)
    }

    pub fn group_metadata(&self, name: &str) -> Option<&GroupMetadata> {
        self.group_metadata.get(name)
    }

    pub fn enabled_groups(&self) -> &[GroupRecord] {
        &self.enabled_groups
    }

    pub fn disabled_groups(&self) -> &[GroupRecord] {
        &self.disabled_groups
    }

    pub fn permissions(&self) -> &[PermissionRecord] {
        &self.permissions
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            users: self.users.len(),
            groups: self.groups.len(),
            edges: self.graph.edge_count(),
            group_grants: self.grants_by_group.values().map(Vec::len).sum(),
            service_account_grants: self.service_account_grants.values().map(Vec::len).sum(),
            permissions: self.permissions.len(),
            disabled_groups: self.disabled_groups.len(),
            checkpoint: self.checkpoint,
        }
    }
}
