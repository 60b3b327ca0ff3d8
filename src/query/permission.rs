//! Permission details: every group and service account holding a permission.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use super::group::get_group_details;
use super::types::{DetailOptions, PermissionDetails, PermissionEntry, ServiceAccountGrants};
use crate::error::Result;
use crate::graph::{Node, Snapshot, Walk};

/// Groups with a direct grant of `name`, every group below them, and the
/// service accounts holding it directly.
///
/// Each group entry is that group's details filtered to `name`. An unknown
/// permission yields an empty result.
pub fn get_permission_details(snapshot: &Snapshot, name: &str) -> Result<PermissionDetails> {
    let direct: BTreeSet<&str> = snapshot
        .groups_with_grants()
        .filter(|(_, grants)| grants.iter().any(|g| g.permission == name))
        .map(|(group, _)| group)
        .collect();

    let mut holders: BTreeSet<String> = direct.iter().map(|g| g.to_string()).collect();
    for group in &direct {
        for reached in snapshot
            .graph()
            .shortest_paths(&Node::group(*group), Walk::Descendants, None)
        {
            if reached.node.is_group() {
                holders.insert(reached.node.name);
            }
        }
    }

    let options = DetailOptions::default().show_permission(name);
    let groups = holders
        .par_iter()
        .map(|group| get_group_details(snapshot, group, &options).map(|d| (group.clone(), d)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let service_accounts = snapshot
        .service_accounts_with_grants()
        .filter_map(|(account, grants)| {
            let own_path = vec![account.to_string()];
            let permissions: Vec<PermissionEntry> = grants
                .iter()
                .filter(|g| g.permission == name)
                .map(|g| PermissionEntry::new(g, &own_path))
                .collect();
            if permissions.is_empty() {
                return None;
            }
            Some((
                account.to_string(),
                ServiceAccountGrants {
                    name: account.to_string(),
                    permissions,
                },
            ))
        })
        .collect();

    Ok(PermissionDetails {
        name: name.to_string(),
        groups,
        service_accounts,
    })
}
