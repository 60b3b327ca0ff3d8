//! Core graph types: nodes, roles, grants and the denormalized records
//! attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of entity a graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    User,
    Group,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::User => write!(f, "User"),
            NodeKind::Group => write!(f, "Group"),
        }
    }
}

/// A node in the membership graph. Only enabled users and groups are nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
}

impl Node {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::User,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Group,
            name: name.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Membership role carried by an edge.
///
/// The discriminant is the persisted representation. New roles must only
/// ever be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Role {
    /// Belongs to the group. Nothing more.
    Member = 0,
    /// Can change the group and approve requests.
    Manager = 1,
    /// Manager plus enable/disable and promoting owners.
    Owner = 2,
    /// Owner that does not inherit the group's permissions.
    NpOwner = 3,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Member, Role::Manager, Role::Owner, Role::NpOwner];

    /// Look up a role by its persisted ordinal.
    pub fn from_index(index: u8) -> Option<Role> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Manager => "manager",
            Role::Owner => "owner",
            Role::NpOwner => "np-owner",
        }
    }

    pub fn is_owner(self) -> bool {
        matches!(self, Role::Owner | Role::NpOwner)
    }

    pub fn is_approver(self) -> bool {
        matches!(self, Role::Owner | Role::NpOwner | Role::Manager)
    }

    /// Whether permissions flow to the member through this edge.
    pub fn inherits_permissions(self) -> bool {
        self != Role::NpOwner
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A directed membership edge `parent -> member` as returned by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEdge {
    pub parent: String,
    pub member: Node,
    pub role: Role,
}

/// Logical generation of the whole dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub counter: i64,
    /// Last-modified time of the counter, in unix seconds.
    pub timestamp: i64,
}

impl Checkpoint {
    pub fn new(counter: i64, timestamp: i64) -> Self {
        Self { counter, timestamp }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.timestamp)
    }
}

/// A permission granted to a group or a service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Group or service account holding the grant.
    pub grantee: String,
    pub permission: String,
    pub argument: String,
    pub audited: bool,
    pub granted_on: DateTime<Utc>,
    pub is_alias: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    CanJoin,
    CanAsk,
    Nobody,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        JoinPolicy::CanAsk
    }
}

/// Flat group summary used by the listing operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub description: String,
    pub email_address: Option<String>,
    pub join_policy: JoinPolicy,
    pub enabled: bool,
    pub is_role_user: bool,
}

/// Per-group contact metadata attached to group nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub description: String,
    pub email_address: Option<String>,
    pub join_policy: JoinPolicy,
}

/// Flat permission summary used by `get_permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub name: String,
    pub description: String,
    pub created_on: DateTime<Utc>,
    pub audited: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub public_key: String,
    pub fingerprint: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub data_key: String,
    pub data_value: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountInfo {
    pub description: String,
    pub machine_set: String,
    /// Group that owns the service account, if it is still enabled.
    pub owner_group: Option<String>,
}

/// Per-user metadata attached to user nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub role_user: bool,
    pub public_keys: Vec<PublicKey>,
    pub metadata: Vec<MetadataEntry>,
    pub service_account: Option<ServiceAccountInfo>,
}

impl UserRecord {
    pub fn is_service_account(&self) -> bool {
        self.service_account.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordinals_are_stable() {
        assert_eq!(Role::Member.index(), 0);
        assert_eq!(Role::Manager.index(), 1);
        assert_eq!(Role::Owner.index(), 2);
        assert_eq!(Role::NpOwner.index(), 3);
        assert_eq!(Role::from_index(3), Some(Role::NpOwner));
        assert_eq!(Role::from_index(4), None);
    }

    #[test]
    fn test_role_names_and_serde() {
        assert_eq!(Role::NpOwner.to_string(), "np-owner");
        assert_eq!(serde_json::to_string(&Role::NpOwner).unwrap(), "\"np-owner\"");
        let role: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, Role::Manager);
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::NpOwner.is_owner());
        assert!(!Role::NpOwner.inherits_permissions());
        assert!(Role::Owner.inherits_permissions());
        assert!(Role::Manager.is_approver());
        assert!(!Role::Member.is_approver());
    }

    #[test]
    fn test_node_ordering_groups_after_users() {
        let mut nodes = vec![Node::group("a"), Node::user("b"), Node::user("a")];
        nodes.sort();
        assert_eq!(nodes, vec![Node::user("a"), Node::user("b"), Node::group("a")]);
    }
}
