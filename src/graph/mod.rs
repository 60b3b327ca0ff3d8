//! Graph module: membership graph, snapshot and the builder that fills it.

pub mod builder;
pub mod checkpoint;
pub mod engine;
pub mod snapshot;
pub mod types;

pub use builder::build_snapshot;
pub use checkpoint::read_checkpoint;
pub use engine::{MembershipGraph, Reached, Walk};
pub use snapshot::{Snapshot, SnapshotStats};
pub use types::{
    Checkpoint, GroupMetadata, GroupRecord, JoinPolicy, MembershipEdge, MetadataEntry, Node,
    NodeKind, PermissionGrant, PermissionRecord, PublicKey, Role, ServiceAccountInfo, UserRecord,
};
