//! # permgraph
//!
//! In-memory cache of a group/permission graph.
//!
//! Users and groups are nodes, memberships are role-labelled edges from a
//! group to its members, and permissions are granted to groups. The cache
//! loads the whole graph from a storage backend into an immutable snapshot,
//! answers membership and permission queries against it, and swaps in a new
//! snapshot whenever the backend's checkpoint counter moves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use permgraph::storage::JsonFileStorage;
//! use permgraph::{DetailOptions, GraphCache, NoAliases, RefreshScheduler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let storage = Arc::new(JsonFileStorage::open("dataset.json"));
//! let cache = Arc::new(GraphCache::load(storage, Arc::new(NoAliases))?);
//!
//! let handle = RefreshScheduler::new(Arc::clone(&cache), Duration::from_secs(60))?.spawn()?;
//!
//! let details = cache.get_group_details("team-sre", &DetailOptions::default())?;
//! println!("{} ancestors, audited: {}", details.groups.len(), details.audited);
//!
//! handle.stop()?;
//! # Ok::<(), permgraph::GraphError>(())
//! ```

pub mod aliases;
pub mod cache;
pub mod config;
pub mod daemon;
pub mod error;
pub mod graph;
pub mod query;
pub mod refresh;
pub mod storage;

// Re-exports for convenience
pub use aliases::{AliasExpander, AliasTable, NoAliases};
pub use cache::{GraphCache, RefreshOutcome};
pub use config::Config;
pub use error::{GraphError, Result, StorageError};

pub use graph::{Checkpoint, GroupRecord, Node, NodeKind, PermissionRecord, Role, Snapshot, UserRecord};
pub use query::{
    get_disabled_groups, get_group_details, get_groups, get_permission_details, get_permissions,
    get_user_details, DetailOptions, GroupDetails, PermissionDetails, UserDetails,
};
pub use refresh::{
    RefreshObserver, RefreshScheduler, RefreshStats, SchedulerControl, SchedulerHandle, TracingObserver,
};
pub use storage::GraphStorage;
