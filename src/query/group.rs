//! Group details: members below, ancestors above, grants flowing down.

use std::collections::BTreeMap;

use super::types::{DetailOptions, GroupDetails, MemberEntry, PermissionEntry};
use crate::error::{GraphError, Result};
use crate::graph::{Node, NodeKind, Snapshot, Walk};

/// Users, subgroups, ancestor groups and effective grants of `name`.
///
/// Grants held by the group itself are reported at distance 0, grants of
/// every ancestor at that ancestor's distance. `audited` is set when any
/// reported grant is audited.
pub fn get_group_details(
    snapshot: &Snapshot,
    name: &str,
    options: &DetailOptions,
) -> Result<GroupDetails> {
    if !snapshot.has_group(name) {
        return Err(GraphError::GroupNotFound(name.to_string()));
    }
    let group = Node::group(name);
    let graph = snapshot.graph();

    let mut users = BTreeMap::new();
    let mut subgroups = BTreeMap::new();
    for reached in graph.shortest_paths(&group, Walk::Descendants, options.cutoff) {
        let target = match reached.node.kind {
            NodeKind::User => &mut users,
            NodeKind::Group => &mut subgroups,
        };
        target.insert(reached.node.name.clone(), MemberEntry::from(reached));
    }

    let own_path = vec![name.to_string()];
    let mut permissions: Vec<PermissionEntry> = snapshot
        .group_grants(name)
        .iter()
        .filter(|g| options.admits(g))
        .map(|g| PermissionEntry::new(g, &own_path))
        .collect();

    let mut groups = BTreeMap::new();
    for reached in graph.shortest_paths(&group, Walk::Ancestors, options.cutoff) {
        permissions.extend(
            snapshot
                .group_grants(&reached.node.name)
                .iter()
                .filter(|g| options.admits(g))
                .map(|g| PermissionEntry::new(g, &reached.path)),
        );
        groups.insert(reached.node.name.clone(), MemberEntry::from(reached));
    }

    let audited = permissions.iter().any(|p| p.audited);
    let metadata = snapshot.group_metadata(name).cloned().unwrap_or_default();

    Ok(GroupDetails {
        name: name.to_string(),
        description: metadata.description,
        email_address: metadata.email_address,
        join_policy: metadata.join_policy,
        users,
        subgroups,
        groups,
        permissions,
        audited,
    })
}
