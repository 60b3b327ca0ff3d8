//! Snapshot builder: storage rows in, one immutable snapshot out.
//!
//! The build issues every storage query up front and aborts on the first
//! failure, so a half-loaded snapshot can never reach the cache.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::engine::MembershipGraph;
use super::snapshot::Snapshot;
use super::types::{Checkpoint, Node, NodeKind, PermissionGrant};
use crate::aliases::AliasExpander;
use crate::storage::{GraphStorage, StorageResult};

/// Build a snapshot from the current contents of `storage`.
///
/// `checkpoint` is the value read before the build started; it is stamped on
/// the snapshot as-is.
pub fn build_snapshot(
    storage: &dyn GraphStorage,
    aliases: &dyn AliasExpander,
    checkpoint: Checkpoint,
) -> StorageResult<Snapshot> {
    // Phase 1: nodes and edges
    let nodes = storage.list_nodes()?;
    let edges = storage.list_edges()?;

    let mut graph = MembershipGraph::new();
    let mut users = BTreeSet::new();
    let mut groups = BTreeSet::new();
    for node in nodes {
        match node.kind {
            NodeKind::User => users.insert(node.name.clone()),
            NodeKind::Group => groups.insert(node.name.clone()),
        };
        graph.add_node(node);
    }

    let mut dropped = 0usize;
    for edge in &edges {
        if !graph.add_edge(&Node::group(&edge.parent), &edge.member, edge.role) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!(dropped, "dropped edges with disabled or missing endpoints");
    }

    // Phase 2: grants, with alias expansion
    let mut grants_by_group = expand_aliases(storage.permission_grants_by_group()?, aliases);
    grants_by_group.retain(|group, _| groups.contains(group));

    // Phase 3: metadata
    let user_metadata = storage.user_metadata()?;
    let group_metadata = storage.group_metadata()?;

    // Phase 4: service accounts live outside the group graph
    let service_account_grants = expand_aliases(storage.service_account_grants()?, aliases);

    // Phase 5: flat listings
    let mut enabled_groups = storage.group_summaries(true)?;
    let mut disabled_groups = storage.group_summaries(false)?;
    let mut permissions = storage.permission_summaries()?;
    enabled_groups.sort_by(|a, b| a.name.cmp(&b.name));
    disabled_groups.sort_by(|a, b| a.name.cmp(&b.name));
    permissions.sort_by(|a, b| a.name.cmp(&b.name));

    let snapshot = Snapshot {
        graph,
        users,
        groups,
        grants_by_group,
        service_account_grants,
        user_metadata,
        group_metadata,
        enabled_groups,
        disabled_groups,
        permissions,
        checkpoint,
        built_at: Utc::now(),
    };
    debug!(
        checkpoint = %checkpoint,
        nodes = snapshot.graph.node_count(),
        edges = snapshot.graph.edge_count(),
        "snapshot built"
    );
    Ok(snapshot)
}

/// Append the alias grants of every grant to its holder's list.
fn expand_aliases(
    mut grants: HashMap<String, Vec<PermissionGrant>>,
    aliases: &dyn AliasExpander,
) -> HashMap<String, Vec<PermissionGrant>> {
    for list in grants.values_mut() {
        let mut expanded = Vec::new();
        for grant in list.iter() {
            for (permission, argument) in aliases.aliases(&grant.permission, &grant.argument) {
                expanded.push(PermissionGrant {
                    grantee: grant.grantee.clone(),
                    permission,
                    argument,
                    audited: grant.audited,
                    granted_on: grant.granted_on,
                    is_alias: true,
                });
            }
        }
        list.extend(expanded);
    }
    grants
}
