//! Query engine: read-only traversals over one captured snapshot.
//!
//! Every function here takes a `&Snapshot`, so a caller that needs several
//! answers from the same generation captures `cache.snapshot()` once and
//! calls them directly.
//!
//! ```ignore
//! let snapshot = cache.snapshot();
//! let details = get_group_details(&snapshot, "team-sre", &DetailOptions::default())?;
//! let user = get_user_details(&snapshot, "gary@a.co", None)?;
//! ```

pub mod group;
pub mod listing;
pub mod permission;
pub mod types;
pub mod user;

pub use group::get_group_details;
pub use listing::{get_disabled_groups, get_groups, get_permissions};
pub use permission::get_permission_details;
pub use types::{
    DetailOptions, GroupDetails, MemberEntry, PermissionDetails, PermissionEntry,
    ServiceAccountGrants, UserDetails,
};
pub use user::get_user_details;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::NoAliases;
    use crate::error::GraphError;
    use crate::graph::{build_snapshot, Checkpoint, Node, Role, Snapshot};
    use crate::storage::{Dataset, MemoryStorage};
    use chrono::Utc;

    fn snapshot(dataset: Dataset) -> Snapshot {
        let storage = MemoryStorage::new(dataset);
        build_snapshot(&storage, &NoAliases, Checkpoint::default()).unwrap()
    }

    /// team-sre ⊂ serving-team ⊂ team-infra
    fn chain() -> Dataset {
        let mut ds = Dataset::new("db");
        ds.add_member("team-infra", &Node::group("serving-team"), Role::Member);
        ds.add_member("serving-team", &Node::group("team-sre"), Role::Member);
        ds.add_member("team-sre", &Node::user("gary@a.co"), Role::Owner);
        ds
    }

    #[test]
    fn test_unknown_names() {
        let snap = snapshot(chain());
        assert!(matches!(
            get_group_details(&snap, "nope", &DetailOptions::default()),
            Err(GraphError::GroupNotFound(_))
        ));
        assert!(matches!(
            get_user_details(&snap, "nope@a.co", None),
            Err(GraphError::UserNotFound(_))
        ));
        // a user name is not a group
        assert!(get_group_details(&snap, "gary@a.co", &DetailOptions::default()).is_err());
    }

    #[test]
    fn test_chain_ancestors() {
        let snap = snapshot(chain());
        let details = get_group_details(&snap, "team-sre", &DetailOptions::default()).unwrap();
        assert_eq!(details.groups["serving-team"].distance, 1);
        assert_eq!(details.groups["team-infra"].distance, 2);
        assert!(details.subgroups.is_empty());
        assert!(!details.audited);
        assert_eq!(details.users["gary@a.co"].rolename, "owner");
    }

    #[test]
    fn test_audited_grant_propagates_down() {
        let mut ds = chain();
        let now = Utc::now();
        ds.add_permission("audited", true, now);
        ds.grant_to_group("team-infra", "audited", "", now);
        let snap = snapshot(ds);

        let details = get_group_details(&snap, "team-sre", &DetailOptions::default()).unwrap();
        assert!(details.audited);
        assert_eq!(details.permissions.len(), 1);
        assert_eq!(details.permissions[0].distance, 2);
        assert_eq!(
            details.permissions[0].path,
            vec!["team-sre", "serving-team", "team-infra"]
        );

        let audited: Vec<String> = get_groups(&snap, true, false).into_iter().map(|g| g.name).collect();
        assert_eq!(audited, vec!["serving-team", "team-infra", "team-sre"]);
        let direct: Vec<String> = get_groups(&snap, false, true).into_iter().map(|g| g.name).collect();
        assert_eq!(direct, vec!["team-infra"]);
    }

    #[test]
    fn test_show_permission_still_lists_ancestors() {
        let mut ds = chain();
        let now = Utc::now();
        ds.grant_to_group("team-infra", "sudo", "shell", now);
        ds.grant_to_group("serving-team", "ssh", "*", now);
        let snap = snapshot(ds);

        let options = DetailOptions::default().show_permission("sudo");
        let details = get_group_details(&snap, "team-sre", &options).unwrap();
        assert_eq!(details.groups.len(), 2);
        assert_eq!(details.permissions.len(), 1);
        assert_eq!(details.permissions[0].permission, "sudo");
    }

    #[test]
    fn test_cutoff_bounds_both_directions() {
        let snap = snapshot(chain());
        let details =
            get_group_details(&snap, "serving-team", &DetailOptions::default().with_cutoff(1)).unwrap();
        assert_eq!(details.groups.keys().collect::<Vec<_>>(), vec!["team-infra"]);
        assert_eq!(details.subgroups.keys().collect::<Vec<_>>(), vec!["team-sre"]);
        assert!(details.users.is_empty());

        let user = get_user_details(&snap, "gary@a.co", Some(2)).unwrap();
        assert_eq!(user.groups.len(), 2);
        assert!(get_user_details(&snap, "gary@a.co", Some(0)).unwrap().groups.is_empty());
    }

    #[test]
    fn test_permission_details_fan_out() {
        // P granted to A, B in A, C in B
        let mut ds = Dataset::new("db");
        ds.add_member("A", &Node::group("B"), Role::Member);
        ds.add_member("B", &Node::group("C"), Role::Member);
        ds.grant_to_group("A", "P", "x", Utc::now());
        let snap = snapshot(ds);

        let details = get_permission_details(&snap, "P").unwrap();
        assert_eq!(details.groups.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(details.groups["C"].permissions[0].distance, 2);
        assert!(details.service_accounts.is_empty());

        let unknown = get_permission_details(&snap, "missing").unwrap();
        assert!(unknown.groups.is_empty());
    }

    #[test]
    fn test_listings() {
        let mut ds = chain();
        let now = Utc::now();
        ds.add_permission("audited", true, now);
        ds.add_permission("plain", false, now);
        ds.add_permission("gone", false, now).enabled = false;
        ds.add_group("old").enabled = false;
        let snap = snapshot(ds);

        let names: Vec<String> = get_permissions(&snap, false).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["audited", "plain"]);
        assert_eq!(get_permissions(&snap, true).len(), 1);
        assert_eq!(get_groups(&snap, false, false).len(), 3);
        let disabled = get_disabled_groups(&snap);
        assert_eq!(disabled.len(), 1);
        assert!(!disabled[0].enabled);
    }
}
