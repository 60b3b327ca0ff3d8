//! Query response types.
//!
//! Maps are `BTreeMap`s so that serialized output is stable across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::{
    JoinPolicy, MetadataEntry, PermissionGrant, PublicKey, Reached, Role, ServiceAccountInfo,
};

/// Knobs shared by the detail queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailOptions {
    /// Maximum traversal depth. `None` walks the whole graph.
    #[serde(default)]
    pub cutoff: Option<usize>,
    /// Only report grants of this permission.
    #[serde(default)]
    pub show_permission: Option<String>,
    /// Include grants produced by alias expansion.
    #[serde(default = "expose_aliases_default")]
    pub expose_aliases: bool,
}

fn expose_aliases_default() -> bool {
    true
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            cutoff: None,
            show_permission: None,
            expose_aliases: true,
        }
    }
}

impl DetailOptions {
    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn show_permission(mut self, permission: impl Into<String>) -> Self {
        self.show_permission = Some(permission.into());
        self
    }

    pub fn hide_aliases(mut self) -> Self {
        self.expose_aliases = false;
        self
    }

    /// Whether `grant` passes the permission and alias filters.
    pub fn admits(&self, grant: &PermissionGrant) -> bool {
        if grant.is_alias && !self.expose_aliases {
            return false;
        }
        match &self.show_permission {
            Some(name) => grant.permission == *name,
            None => true,
        }
    }
}

// ─── Entries ───────────────────────────────────────────────────────

/// A user or group reached from the queried node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub name: String,
    pub path: Vec<String>,
    pub distance: usize,
    /// Role ordinal.
    pub role: u8,
    pub rolename: String,
}

impl MemberEntry {
    pub fn new(name: impl Into<String>, path: Vec<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            distance: path.len().saturating_sub(1),
            path,
            role: role.index(),
            rolename: role.name().to_string(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        Role::from_index(self.role)
    }
}

impl From<Reached> for MemberEntry {
    fn from(reached: Reached) -> Self {
        MemberEntry::new(reached.node.name, reached.path, reached.role)
    }
}

/// A grant as seen from the queried node, with the path it arrived by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub permission: String,
    pub argument: String,
    pub audited: bool,
    pub granted_on: DateTime<Utc>,
    pub distance: usize,
    pub path: Vec<String>,
    pub is_alias: bool,
}

impl PermissionEntry {
    pub fn new(grant: &PermissionGrant, path: &[String]) -> Self {
        Self {
            permission: grant.permission.clone(),
            argument: grant.argument.clone(),
            audited: grant.audited,
            granted_on: grant.granted_on,
            distance: path.len().saturating_sub(1),
            path: path.to_vec(),
            is_alias: grant.is_alias,
        }
    }
}

// ─── Group Details ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    pub name: String,
    pub description: String,
    pub email_address: Option<String>,
    pub join_policy: JoinPolicy,
    /// Descendant users.
    pub users: BTreeMap<String, MemberEntry>,
    /// Descendant groups.
    pub subgroups: BTreeMap<String, MemberEntry>,
    /// Ancestor groups.
    pub groups: BTreeMap<String, MemberEntry>,
    pub permissions: Vec<PermissionEntry>,
    pub audited: bool,
}

// ─── User Details ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub name: String,
    pub role_user: bool,
    pub is_service_account: bool,
    pub service_account: Option<ServiceAccountInfo>,
    pub public_keys: Vec<PublicKey>,
    pub metadata: Vec<MetadataEntry>,
    pub groups: BTreeMap<String, MemberEntry>,
    pub permissions: Vec<PermissionEntry>,
}

// ─── Permission Details ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountGrants {
    pub name: String,
    pub permissions: Vec<PermissionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDetails {
    pub name: String,
    pub groups: BTreeMap<String, GroupDetails>,
    pub service_accounts: BTreeMap<String, ServiceAccountGrants>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(permission: &str, is_alias: bool) -> PermissionGrant {
        PermissionGrant {
            grantee: "g".into(),
            permission: permission.into(),
            argument: String::new(),
            audited: false,
            granted_on: Utc::now(),
            is_alias,
        }
    }

    #[test]
    fn test_options_admit() {
        let all = DetailOptions::default();
        assert!(all.admits(&grant("ssh", true)));

        let only_ssh = DetailOptions::default().show_permission("ssh");
        assert!(only_ssh.admits(&grant("ssh", false)));
        assert!(!only_ssh.admits(&grant("sudo", false)));

        let no_alias = DetailOptions::default().hide_aliases();
        assert!(!no_alias.admits(&grant("ssh", true)));
        assert!(no_alias.admits(&grant("ssh", false)));
    }

    #[test]
    fn test_member_entry_distance_and_rolename() {
        let entry = MemberEntry::new("c", vec!["a".into(), "b".into(), "c".into()], Role::NpOwner);
        assert_eq!(entry.distance, 2);
        assert_eq!(entry.role, 3);
        assert_eq!(entry.rolename, "np-owner");
        assert_eq!(entry.role(), Some(Role::NpOwner));
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: DetailOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, DetailOptions::default());
    }
}
