//! User details: groups a user belongs to and the grants they inherit.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::types::{MemberEntry, PermissionEntry, UserDetails};
use crate::error::{GraphError, Result};
use crate::graph::{Node, Snapshot, Walk};

/// Groups and effective grants of user `name`.
///
/// An np-owner edge records its group at distance 1 and stops there: the
/// group's grants and its ancestors are not reached through it. Service
/// accounts report their own grants and no groups.
pub fn get_user_details(snapshot: &Snapshot, name: &str, cutoff: Option<usize>) -> Result<UserDetails> {
    if !snapshot.has_user(name) {
        return Err(GraphError::UserNotFound(name.to_string()));
    }
    let record = snapshot.user_metadata(name);
    let is_service_account = record.map_or(false, |r| r.is_service_account());

    let mut details = UserDetails {
        name: name.to_string(),
        role_user: record.map_or(false, |r| r.role_user),
        is_service_account,
        service_account: record.and_then(|r| r.service_account.clone()),
        public_keys: record.map(|r| r.public_keys.clone()).unwrap_or_default(),
        metadata: record.map(|r| r.metadata.clone()).unwrap_or_default(),
        groups: BTreeMap::new(),
        permissions: Vec::new(),
    };

    if is_service_account {
        let own_path = vec![name.to_string()];
        details.permissions = snapshot
            .service_account_grants(name)
            .iter()
            .map(|g| PermissionEntry::new(g, &own_path))
            .collect();
        return Ok(details);
    }

    if cutoff == Some(0) {
        return Ok(details);
    }

    let user = Node::user(name);
    let graph = snapshot.graph();
    // shortest path to each group reached through a permission-bearing edge
    let mut granting: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (parent, role) in graph.neighbors(&user, Walk::Ancestors) {
        let direct_path = vec![name.to_string(), parent.name.clone()];
        if !role.inherits_permissions() {
            keep_shortest(&mut details.groups, MemberEntry::new(&parent.name, direct_path, role));
            continue;
        }

        let mut reached = vec![MemberEntry::new(&parent.name, direct_path, role)];
        let remaining = cutoff.map(|c| c - 1);
        for ancestor in graph.shortest_paths(&parent, Walk::Ancestors, remaining) {
            let mut path = Vec::with_capacity(ancestor.path.len() + 1);
            path.push(name.to_string());
            path.extend(ancestor.path);
            reached.push(MemberEntry::new(ancestor.node.name, path, ancestor.role));
        }

        for entry in reached {
            match granting.entry(entry.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.path.clone());
                }
                Entry::Occupied(mut slot) => {
                    if entry.path.len() < slot.get().len() {
                        slot.insert(entry.path.clone());
                    }
                }
            }
            keep_shortest(&mut details.groups, entry);
        }
    }

    let mut ordered: Vec<(&String, &Vec<String>)> = granting.iter().collect();
    ordered.sort_by(|a, b| (a.1.len(), a.0).cmp(&(b.1.len(), b.0)));
    for (group, path) in ordered {
        details.permissions.extend(
            snapshot
                .group_grants(group)
                .iter()
                .map(|g| PermissionEntry::new(g, path)),
        );
    }

    Ok(details)
}

fn keep_shortest(groups: &mut BTreeMap<String, MemberEntry>, entry: MemberEntry) {
    match groups.entry(entry.name.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
        Entry::Occupied(mut slot) => {
            if entry.distance < slot.get().distance {
                slot.insert(entry);
            }
        }
    }
}

