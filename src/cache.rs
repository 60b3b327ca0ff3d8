//! The graph cache: one published snapshot, replaced whole on refresh.
//!
//! Readers clone the current `Arc<Snapshot>` under a brief read guard and
//! traverse it without holding any lock. A refresh builds the next snapshot
//! under a separate rebuild lock, so at most one build runs at a time, and
//! takes the write guard only to swap the reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::aliases::{AliasExpander, NoAliases};
use crate::error::{GraphError, Result};
use crate::graph::{
    build_snapshot, read_checkpoint, Checkpoint, GroupRecord, PermissionRecord, Snapshot,
    SnapshotStats, UserRecord,
};
use crate::query::{self, DetailOptions, GroupDetails, PermissionDetails, UserDetails};
use crate::storage::GraphStorage;

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The checkpoint matched the installed snapshot; storage was not queried.
    Unchanged(Checkpoint),
    /// A new snapshot was built and installed.
    Updated {
        checkpoint: Checkpoint,
        elapsed: Duration,
    },
}

pub struct GraphCache {
    storage: Arc<dyn GraphStorage>,
    aliases: Arc<dyn AliasExpander>,
    current: RwLock<Arc<Snapshot>>,
    /// Set once the first built snapshot is installed.
    loaded: AtomicBool,
    rebuild: Mutex<()>,
}

impl GraphCache {
    /// A cache over `storage` holding an empty snapshot until the first
    /// refresh.
    pub fn new(storage: Arc<dyn GraphStorage>, aliases: Arc<dyn AliasExpander>) -> Self {
        Self {
            storage,
            aliases,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            loaded: AtomicBool::new(false),
            rebuild: Mutex::new(()),
        }
    }

    pub fn without_aliases(storage: Arc<dyn GraphStorage>) -> Self {
        Self::new(storage, Arc::new(NoAliases))
    }

    /// Build a cache and load its first snapshot.
    pub fn load(storage: Arc<dyn GraphStorage>, aliases: Arc<dyn AliasExpander>) -> Result<Self> {
        let cache = Self::new(storage, aliases);
        cache.refresh()?;
        Ok(cache)
    }

    pub fn storage(&self) -> &Arc<dyn GraphStorage> {
        &self.storage
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn current_checkpoint(&self) -> Checkpoint {
        self.snapshot().checkpoint()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SnapshotStats {
        self.snapshot().stats()
    }

    /// Publish `snapshot`. Refuses one built from an older checkpoint than
    /// the snapshot already installed.
    pub fn install(&self, snapshot: Snapshot) -> Result<()> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let installed = current.checkpoint();
        let offered = snapshot.checkpoint();
        if self.is_loaded() && offered.counter < installed.counter {
            return Err(GraphError::StaleSnapshot { offered, installed });
        }
        *current = Arc::new(snapshot);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Rebuild if the storage checkpoint moved since the installed snapshot.
    ///
    /// A storage counter lower than the installed one is an error: the
    /// dataset was replaced by an older copy.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        self.rebuild_if(|checkpoint| !self.is_loaded() || checkpoint != self.current_checkpoint())
    }

    /// Rebuild regardless of the checkpoint.
    pub fn force_rebuild(&self) -> Result<RefreshOutcome> {
        self.rebuild_if(|_| true)
    }

    fn rebuild_if<F>(&self, needed: F) -> Result<RefreshOutcome>
    where
        F: Fn(Checkpoint) -> bool,
    {
        let started = Instant::now();
        let snapshot = {
            let _guard = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
            let checkpoint =
                read_checkpoint(self.storage.as_ref()).map_err(GraphError::RebuildFailed)?;
            let installed = self.current_checkpoint();
            if self.is_loaded() && checkpoint.counter < installed.counter {
                return Err(GraphError::CheckpointRegressed {
                    found: checkpoint,
                    installed,
                });
            }
            if !needed(checkpoint) {
                debug!(checkpoint = %checkpoint, "checkpoint unchanged, not updating");
                return Ok(RefreshOutcome::Unchanged(checkpoint));
            }
            debug!(
                from = %installed,
                to = %checkpoint,
                "checkpoint changed, rebuilding"
            );
            build_snapshot(self.storage.as_ref(), self.aliases.as_ref(), checkpoint)
                .map_err(GraphError::RebuildFailed)?
        };

        let checkpoint = snapshot.checkpoint();
        match self.install(snapshot) {
            Ok(()) => {}
            Err(GraphError::StaleSnapshot { offered, installed }) => {
                // another refresh installed a newer snapshot while this one was building
                debug!(offered = %offered, installed = %installed, "dropping superseded snapshot");
                return Ok(RefreshOutcome::Unchanged(installed));
            }
            Err(e) => return Err(e),
        }
        let elapsed = started.elapsed();
        debug!(
            checkpoint = %checkpoint,
            elapsed_ms = elapsed.as_millis() as u64,
            "snapshot installed"
        );
        Ok(RefreshOutcome::Updated { checkpoint, elapsed })
    }

    // ─── Queries ───────────────────────────────────────────────────

    pub fn get_group_details(&self, name: &str, options: &DetailOptions) -> Result<GroupDetails> {
        query::get_group_details(&self.snapshot(), name, options)
    }

    pub fn get_user_details(&self, name: &str, cutoff: Option<usize>) -> Result<UserDetails> {
        query::get_user_details(&self.snapshot(), name, cutoff)
    }

    pub fn get_permission_details(&self, name: &str) -> Result<PermissionDetails> {
        query::get_permission_details(&self.snapshot(), name)
    }

    pub fn get_groups(&self, audited: bool, directly_audited: bool) -> Vec<GroupRecord> {
        query::get_groups(&self.snapshot(), audited, directly_audited)
    }

    pub fn get_permissions(&self, audited: bool) -> Vec<PermissionRecord> {
        query::get_permissions(&self.snapshot(), audited)
    }

    pub fn get_disabled_groups(&self) -> Vec<GroupRecord> {
        query::get_disabled_groups(&self.snapshot())
    }

    /// Enabled user names, sorted.
    pub fn users(&self) -> Vec<String> {
        self.snapshot().users().map(str::to_string).collect()
    }

    /// Enabled group names, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.snapshot().groups().map(str::to_string).collect()
    }

    pub fn user_metadata(&self, name: &str) -> Result<UserRecord> {
        self.snapshot()
            .user_metadata(name)
            .cloned()
            .ok_or_else(|| GraphError::UserNotFound(name.to_string()))
    }
}
