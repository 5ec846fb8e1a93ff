// src/pool.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::keeper::Keeper;
use crate::linda::Linda;
use crate::types::{GcPolicy, PoolConfig};

/// The fixed set of keepers backing every Linda of one runtime universe.
///
/// Each Linda is bound to exactly one keeper (by its group index) for its
/// whole lifetime, so no operation ever needs two keeper mutexes at once.
pub struct KeeperPool {
    keepers: Box<[Keeper]>,
    gc: GcPolicy,
    closing: AtomicBool,
}

impl KeeperPool {
    /// Construct the keeper interpreters.
    ///
    /// Their collectors are halted unless the policy is `Never`: collecting
    /// inside a keeper while its mutex is held would stall every Linda
    /// sharing it, so reclamation is deferred to the per-primitive policy.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let halt_gc = config.gc != GcPolicy::Never;
        let keepers: Box<[Keeper]> = (0..config.nb_keepers)
            .map(|i| Keeper::new(i, halt_gc))
            .collect();
        debug!(
            "keeper pool up: {} keeper(s), gc policy {:?}",
            keepers.len(),
            config.gc
        );
        Arc::new(KeeperPool {
            keepers,
            gc: config.gc,
            closing: AtomicBool::new(false),
        })
    }

    /// Tear the pool down. Idempotent; a second call is a no-op.
    ///
    /// Raises the closing flag first, so Linda finalizers running after this
    /// point observe "no keeper" and skip their registry cleanup instead of
    /// touching a dying keeper.
    pub fn shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("keeper pool shutting down");
        for keeper in &self.keepers {
            let mut state = keeper.lock();
            state.drain();
        }
    }

    /// True once [`shutdown`](KeeperPool::shutdown) has begun.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Number of keepers, observed as 0 while the pool is closing.
    pub fn keeper_count(&self) -> usize {
        if self.is_closing() { 0 } else { self.keepers.len() }
    }

    pub(crate) fn gc_policy(&self) -> GcPolicy {
        self.gc
    }

    /// The keeper owning `group`, or None when communication is disabled
    /// (zero keepers) or the pool is closing.
    pub(crate) fn which_keeper(&self, group: usize) -> Option<&Keeper> {
        if self.is_closing() {
            return None;
        }
        self.keepers.get(group)
    }

    /// Create a channel bound to this pool.
    ///
    /// `group` selects the keeper (`group < nb_keepers`). With more than one
    /// keeper the group is mandatory: the pool refuses to route silently.
    /// With zero or one keeper an omitted group defaults to 0.
    pub fn new_linda(
        self: &Arc<Self>,
        name: Option<&str>,
        group: Option<usize>,
    ) -> Result<Linda> {
        let nb = self.keepers.len();
        let group = match group {
            Some(g) => {
                if nb > 0 && g >= nb {
                    return Err(Error::invalid_argument(format!(
                        "group {g} out of range (0..{nb})"
                    )));
                }
                g
            }
            None if nb > 1 => {
                return Err(Error::invalid_argument(
                    "a group is required when the pool has more than one keeper",
                ));
            }
            None => 0,
        };
        Ok(Linda::new(self.clone(), name, group))
    }
}
