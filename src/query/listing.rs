//! Flat listings of groups and permissions.

use std::collections::BTreeSet;

use crate::graph::{GroupRecord, Node, PermissionRecord, Snapshot, Walk};

/// Enabled groups, sorted by name.
///
/// `directly_audited` keeps only groups holding an audited grant themselves.
/// `audited` keeps those plus every group below them.
pub fn get_groups(snapshot: &Snapshot, audited: bool, directly_audited: bool) -> Vec<GroupRecord> {
    if !audited && !directly_audited {
        return snapshot.enabled_groups().to_vec();
    }

    let direct: BTreeSet<String> = snapshot
        .groups_with_grants()
        .filter(|(_, grants)| grants.iter().any(|g| g.audited))
        .map(|(group, _)| group.to_string())
        .collect();

    let selected = if directly_audited {
        direct
    } else {
        let mut all = direct.clone();
        for group in &direct {
            for reached in snapshot
                .graph()
                .shortest_paths(&Node::group(group.as_str()), Walk::Descendants, None)
            {
                if reached.node.is_group() {
                    all.insert(reached.node.name);
                }
            }
        }
        all
    };

    snapshot
        .enabled_groups()
        .iter()
        .filter(|g| selected.contains(&g.name))
        .cloned()
        .collect()
}

/// Enabled permissions, sorted by name; only audited ones when `audited`.
pub fn get_permissions(snapshot: &Snapshot, audited: bool) -> Vec<PermissionRecord> {
    snapshot
        .permissions()
        .iter()
        .filter(|p| !audited || p.audited)
        .cloned()
        .collect()
}

pub fn get_disabled_groups(snapshot: &Snapshot) -> Vec<GroupRecord> {
    snapshot.disabled_groups().to_vec()
}
