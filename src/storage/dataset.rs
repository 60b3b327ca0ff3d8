//! Raw dataset rows and the filtering queries shared by the reference
//! storages.
//!
//! A `Dataset` mirrors the tables of the backing store: users, groups,
//! permissions, memberships, grants and the `updates` counter. The query
//! methods apply the same filters a relational implementation would.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::CounterRow;
use crate::graph::{
    GroupMetadata, GroupRecord, JoinPolicy, MembershipEdge, MetadataEntry, Node, NodeKind,
    PermissionGrant, PermissionRecord, PublicKey, Role, ServiceAccountInfo, UserRecord,
};

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub role_user: bool,
    #[serde(default)]
    pub service_account: Option<ServiceAccountRow>,
    #[serde(default)]
    pub public_keys: Vec<PublicKey>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountRow {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub machine_set: String,
    #[serde(default)]
    pub owner_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub join_policy: JoinPolicy,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub audited: bool,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRow {
    pub group: String,
    pub member_kind: NodeKind,
    pub member: String,
    #[serde(default = "member_role")]
    pub role: Role,
    #[serde(default = "enabled_default")]
    pub active: bool,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

fn member_role() -> Role {
    Role::Member
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRow {
    pub grantee: String,
    pub permission: String,
    #[serde(default)]
    pub argument: String,
    pub granted_on: DateTime<Utc>,
}

/// Every table the graph is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Name of the database this dump was taken from.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub counter: Option<CounterRow>,
    #[serde(default)]
    pub users: Vec<UserRow>,
    #[serde(default)]
    pub groups: Vec<GroupRow>,
    #[serde(default)]
    pub permissions: Vec<PermissionRow>,
    #[serde(default)]
    pub memberships: Vec<MembershipRow>,
    #[serde(default)]
    pub group_grants: Vec<GrantRow>,
    #[serde(default)]
    pub service_account_grants: Vec<GrantRow>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ─── Mutations ─────────────────────────────────────────────────

    /// Bump the `updates` counter, creating it on first use.
    pub fn bump_counter(&mut self, now: DateTime<Utc>) {
        let count = self.counter.map_or(0, |c| c.count) + 1;
        self.counter = Some(CounterRow {
            count,
            last_modified: now,
        });
    }

    pub fn add_user(&mut self, name: &str) -> &mut UserRow {
        if let Some(pos) = self.users.iter().position(|u| u.name == name) {
            return &mut self.users[pos];
        }
        self.users.push(UserRow {
            name: name.to_string(),
            enabled: true,
            role_user: false,
            service_account: None,
            public_keys: Vec::new(),
            metadata: Vec::new(),
        });
        let last = self.users.len() - 1;
        &mut self.users[last]
    }

    pub fn add_service_account(&mut self, name: &str, owner_group: Option<&str>) -> &mut UserRow {
        let user = self.add_user(name);
        user.service_account = Some(ServiceAccountRow {
            description: String::new(),
            machine_set: String::new(),
            owner_group: owner_group.map(str::to_string),
        });
        user
    }

    pub fn add_group(&mut self, name: &str) -> &mut GroupRow {
        if let Some(pos) = self.groups.iter().position(|g| g.name == name) {
            return &mut self.groups[pos];
        }
        self.groups.push(GroupRow {
            name: name.to_string(),
            description: String::new(),
            email_address: None,
            join_policy: JoinPolicy::CanAsk,
            enabled: true,
        });
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn add_permission(&mut self, name: &str, audited: bool, now: DateTime<Utc>) -> &mut PermissionRow {
        if let Some(pos) = self.permissions.iter().position(|p| p.name == name) {
            return &mut self.permissions[pos];
        }
        self.permissions.push(PermissionRow {
            name: name.to_string(),
            description: String::new(),
            created_on: now,
            audited,
            enabled: true,
        });
        let last = self.permissions.len() - 1;
        &mut self.permissions[last]
    }

    /// Add `member` to `group`, creating both if needed. Re-adding replaces
    /// the role and reactivates the membership.
    pub fn add_member(&mut self, group: &str, member: &Node, role: Role) {
        self.add_group(group);
        match member.kind {
            NodeKind::User => {
                self.add_user(&member.name);
            }
            NodeKind::Group => {
                self.add_group(&member.name);
            }
        }
        self.memberships
            .retain(|m| !(m.group == group && m.member_kind == member.kind && m.member == member.name));
        self.memberships.push(MembershipRow {
            group: group.to_string(),
            member_kind: member.kind,
            member: member.name.clone(),
            role,
            active: true,
            expiration: None,
        });
    }

    pub fn grant_to_group(&mut self, group: &str, permission: &str, argument: &str, now: DateTime<Utc>) {
        self.add_group(group);
        self.add_permission(permission, false, now);
        self.group_grants.push(GrantRow {
            grantee: group.to_string(),
            permission: permission.to_string(),
            argument: argument.to_string(),
            granted_on: now,
        });
    }

    pub fn grant_to_service_account(
        &mut self,
        account: &str,
        permission: &str,
        argument: &str,
        now: DateTime<Utc>,
    ) {
        self.add_permission(permission, false, now);
        self.service_account_grants.push(GrantRow {
            grantee: account.to_string(),
            permission: permission.to_string(),
            argument: argument.to_string(),
            granted_on: now,
        });
    }

    // ─── Queries ───────────────────────────────────────────────────

    fn enabled_users(&self) -> HashSet<&str> {
        self.users
            .iter()
            .filter(|u| u.enabled)
            .map(|u| u.name.as_str())
            .collect()
    }

    fn enabled_groups(&self) -> HashSet<&str> {
        self.groups
            .iter()
            .filter(|g| g.enabled)
            .map(|g| g.name.as_str())
            .collect()
    }

    fn enabled_permissions(&self) -> HashMap<&str, &PermissionRow> {
        self.permissions
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (p.name.as_str(), p))
            .collect()
    }

    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .users
            .iter()
            .filter(|u| u.enabled)
            .map(|u| Node::user(&u.name))
            .chain(self.groups.iter().filter(|g| g.enabled).map(|g| Node::group(&g.name)))
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Memberships that are active, unexpired at `now`, and join two
    /// enabled entities.
    pub fn edges(&self, now: DateTime<Utc>) -> Vec<MembershipEdge> {
        let users = self.enabled_users();
        let groups = self.enabled_groups();
        self.memberships
            .iter()
            .filter(|m| m.active)
            .filter(|m| m.expiration.map_or(true, |exp| exp > now))
            .filter(|m| groups.contains(m.group.as_str()))
            .filter(|m| match m.member_kind {
                NodeKind::User => users.contains(m.member.as_str()),
                NodeKind::Group => groups.contains(m.member.as_str()),
            })
            .map(|m| MembershipEdge {
                parent: m.group.clone(),
                member: Node {
                    kind: m.member_kind,
                    name: m.member.clone(),
                },
                role: m.role,
            })
            .collect()
    }

    fn grants(
        &self,
        rows: &[GrantRow],
        holders: &HashSet<&str>,
    ) -> HashMap<String, Vec<PermissionGrant>> {
        let permissions = self.enabled_permissions();
        let mut out: HashMap<String, Vec<PermissionGrant>> = HashMap::new();
        for row in rows {
            if !holders.contains(row.grantee.as_str()) {
                continue;
            }
            let Some(permission) = permissions.get(row.permission.as_str()) else {
                continue;
            };
            out.entry(row.grantee.clone()).or_default().push(PermissionGrant {
                grantee: row.grantee.clone(),
                permission: row.permission.clone(),
                argument: row.argument.clone(),
                audited: permission.audited,
                granted_on: row.granted_on,
                is_alias: false,
            });
        }
        out
    }

    pub fn group_grants(&self) -> HashMap<String, Vec<PermissionGrant>> {
        self.grants(&self.group_grants, &self.enabled_groups())
    }

    pub fn service_account_grants(&self) -> HashMap<String, Vec<PermissionGrant>> {
        let accounts: HashSet<&str> = self
            .users
            .iter()
            .filter(|u| u.enabled && u.service_account.is_some())
            .map(|u| u.name.as_str())
            .collect();
        self.grants(&self.service_account_grants, &accounts)
    }

    pub fn user_metadata(&self) -> HashMap<String, UserRecord> {
        let groups = self.enabled_groups();
        self.users
            .iter()
            .filter(|u| u.enabled)
            .map(|u| {
                let record = UserRecord {
                    name: u.name.clone(),
                    role_user: u.role_user,
                    public_keys: u.public_keys.clone(),
                    metadata: u.metadata.clone(),
                    service_account: u.service_account.as_ref().map(|sa| ServiceAccountInfo {
                        description: sa.description.clone(),
                        machine_set: sa.machine_set.clone(),
                        owner_group: sa
                            .owner_group
                            .clone()
                            .filter(|g| groups.contains(g.as_str())),
                    }),
                };
                (u.name.clone(), record)
            })
            .collect()
    }

    pub fn group_metadata(&self) -> HashMap<String, GroupMetadata> {
        self.groups
            .iter()
            .filter(|g| g.enabled)
            .map(|g| {
                let metadata = GroupMetadata {
                    description: g.description.clone(),
                    email_address: g.email_address.clone(),
                    join_policy: g.join_policy,
                };
                (g.name.clone(), metadata)
            })
            .collect()
    }

    pub fn group_summaries(&self, enabled: bool) -> Vec<GroupRecord> {
        let role_users: HashSet<&str> = self
            .users
            .iter()
            .filter(|u| u.role_user)
            .map(|u| u.name.as_str())
            .collect();
        let mut out: Vec<GroupRecord> = self
            .groups
            .iter()
            .filter(|g| g.enabled == enabled)
            .map(|g| GroupRecord {
                name: g.name.clone(),
                description: g.description.clone(),
                email_address: g.email_address.clone(),
                join_policy: g.join_policy,
                enabled: g.enabled,
                is_role_user: role_users.contains(g.name.as_str()),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn permission_summaries(&self) -> Vec<PermissionRecord> {
        let mut out: Vec<PermissionRecord> = self
            .permissions
            .iter()
            .filter(|p| p.enabled)
            .map(|p| PermissionRecord {
                name: p.name.clone(),
                description: p.description.clone(),
                created_on: p.created_on,
                audited: p.audited,
                enabled: p.enabled,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_bump_counter_starts_at_one() {
        let mut ds = Dataset::new("db");
        assert!(ds.counter.is_none());
        ds.bump_counter(at(10));
        ds.bump_counter(at(20));
        let counter = ds.counter.unwrap();
        assert_eq!(counter.count, 2);
        assert_eq!(counter.last_modified, at(20));
    }

    #[test]
    fn test_edges_skip_expired_inactive_and_disabled() {
        let now = at(1_000);
        let mut ds = Dataset::new("db");
        ds.add_member("g", &Node::user("alive"), Role::Member);
        ds.add_member("g", &Node::user("expired"), Role::Member);
        ds.add_member("g", &Node::user("later"), Role::Member);
        ds.add_member("g", &Node::user("inactive"), Role::Member);
        ds.add_member("g", &Node::user("disabled"), Role::Member);
        for m in ds.memberships.iter_mut() {
            match m.member.as_str() {
                "expired" => m.expiration = Some(now - Duration::seconds(1)),
                "later" => m.expiration = Some(now + Duration::days(1)),
                "inactive" => m.active = false,
                _ => {}
            }
        }
        ds.add_user("disabled").enabled = false;

        let members: Vec<String> = ds.edges(now).into_iter().map(|e| e.member.name).collect();
        assert_eq!(members, vec!["alive", "later"]);
    }

    #[test]
    fn test_disabled_group_drops_edges_and_grants() {
        let now = at(1_000);
        let mut ds = Dataset::new("db");
        ds.add_member("parent", &Node::group("child"), Role::Member);
        ds.grant_to_group("child", "ssh", "*", now);
        ds.add_group("child").enabled = false;

        assert!(ds.edges(now).is_empty());
        assert!(ds.group_grants().is_empty());
        assert_eq!(ds.nodes(), vec![Node::group("parent")]);
        assert_eq!(ds.group_summaries(false)[0].name, "child");
    }

    #[test]
    fn test_disabled_permission_grants_are_hidden() {
        let now = at(5);
        let mut ds = Dataset::new("db");
        ds.grant_to_group("g", "old", "", now);
        ds.grant_to_group("g", "new", "x", now);
        ds.add_permission("old", false, now).enabled = false;

        let grants = ds.group_grants();
        let names: Vec<&str> = grants["g"].iter().map(|g| g.permission.as_str()).collect();
        assert_eq!(names, vec!["new"]);
        assert_eq!(ds.permission_summaries().len(), 1);
    }

    #[test]
    fn test_grant_carries_permission_audited_flag() {
        let now = at(5);
        let mut ds = Dataset::new("db");
        ds.add_permission("audited", true, now);
        ds.grant_to_group("g", "audited", "", now);
        assert!(ds.group_grants()["g"][0].audited);
    }

    #[test]
    fn test_role_user_summary_flag() {
        let mut ds = Dataset::new("db");
        ds.add_group("role@a.co");
        ds.add_user("role@a.co").role_user = true;
        ds.add_group("plain");
        let summaries = ds.group_summaries(true);
        assert!(summaries.iter().find(|g| g.name == "role@a.co").unwrap().is_role_user);
        assert!(!summaries.iter().find(|g| g.name == "plain").unwrap().is_role_user);
    }

    #[test]
    fn test_service_account_grants_only_for_service_accounts() {
        let now = at(5);
        let mut ds = Dataset::new("db");
        ds.add_service_account("svc@svc.localhost", Some("owners"));
        ds.add_user("human@a.co");
        ds.grant_to_service_account("svc@svc.localhost", "deploy", "*", now);
        ds.grant_to_service_account("human@a.co", "deploy", "*", now);

        let grants = ds.service_account_grants();
        assert_eq!(grants.len(), 1);
        assert!(grants.contains_key("svc@svc.localhost"));

        // owner group does not exist, so the link is dropped
        let meta = ds.user_metadata();
        let sa = meta["svc@svc.localhost"].service_account.as_ref().unwrap();
        assert_eq!(sa.owner_group, None);
    }

    #[test]
    fn test_dataset_json_defaults() {
        let json = r#"{
            "name": "prod",
            "users": [{"name": "a@a.co"}],
            "groups": [{"name": "team"}],
            "memberships": [{"group": "team", "member_kind": "User", "member": "a@a.co"}]
        }"#;
        let ds: Dataset = serde_json::from_str(json).unwrap();
        assert!(ds.users[0].enabled);
        assert_eq!(ds.memberships[0].role, Role::Member);
        assert_eq!(ds.groups[0].join_policy, JoinPolicy::CanAsk);
        assert_eq!(ds.edges(Utc::now()).len(), 1);
    }
}
