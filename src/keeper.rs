// src/keeper.rs
//
// A keeper owns the actual storage for the Lindas routed to it: an auxiliary
// interpreter plus a registry of per-channel, per-key FIFOs, all guarded by
// one mutex. The same mutex doubles as the wait mutex for the condition
// variables of every Linda bound to this keeper — that is what makes
// "notify inside the critical section" correct in the channel layer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::fifo::KeyFifo;
use crate::interp::Interp;
use crate::types::{GcPolicy, Limit, LindaId};
use crate::value::{Key, Value};

/// Raw per-key snapshot produced by [`KeeperState::dump`]; the channel layer
/// turns it into the public dump shape.
pub(crate) type DumpEntry = (Key, usize, usize, Limit, Vec<Value>);

pub(crate) struct KeeperState {
    pub(crate) interp: Interp,
    store: HashMap<LindaId, HashMap<Key, KeyFifo>>,
}

pub(crate) struct Keeper {
    state: Mutex<KeeperState>,
}

impl Keeper {
    pub fn new(index: usize, halt_gc: bool) -> Self {
        let mut interp = Interp::with_name(format!("Keeper #{}", index + 1));
        if halt_gc {
            interp.gc_stop();
        }
        Keeper {
            state: Mutex::new(KeeperState {
                interp,
                store: HashMap::new(),
            }),
        }
    }

    /// Acquire the keeper. Poisoning is swallowed: a worker that panicked
    /// mid-operation must not wedge every other worker's finalizers.
    pub fn lock(&self) -> MutexGuard<'_, KeeperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeeperState {
    fn keys_db(&mut self, linda: LindaId) -> &mut HashMap<Key, KeyFifo> {
        self.store.entry(linda).or_default()
    }

    fn release_values<'v>(&mut self, values: impl IntoIterator<Item = &'v Value>) {
        let bytes: usize = values.into_iter().map(Value::deep_size).sum();
        self.interp.release(bytes);
    }

    /// Queue `values` on `(linda, key)` if the whole batch fits.
    ///
    /// `values` have already been copied into this keeper's interpreter.
    /// Returns false — and stores nothing — when the limit would be
    /// exceeded; a partial push is never observable.
    pub fn send(&mut self, linda: LindaId, key: &Key, values: Vec<Value>) -> bool {
        let fifo = self.keys_db(linda).entry(key.clone()).or_insert_with(KeyFifo::new);
        if !fifo.admits(values.len()) {
            self.release_values(&values);
            return false;
        }
        fifo.push(values);
        true
    }

    /// Pop one value from the first non-empty key, scanning left to right.
    pub fn receive(&mut self, linda: LindaId, keys: &[Key]) -> Option<(Key, Value)> {
        let db = self.keys_db(linda);
        let key = keys
            .iter()
            .find(|k| db.get(*k).is_some_and(|fifo| fifo.count() > 0))?
            .clone();
        let value = db.get_mut(&key)?.pop(1).pop()?;
        self.release_values([&value]);
        Some((key, value))
    }

    /// Pop between `min` and `max` values from one key, or nothing if fewer
    /// than `min` are available. Bounds are validated by the channel layer.
    pub fn receive_batched(
        &mut self,
        linda: LindaId,
        key: &Key,
        min: usize,
        max: usize,
    ) -> Option<Vec<Value>> {
        let fifo = self.keys_db(linda).get_mut(key)?;
        if fifo.count() < min {
            return None;
        }
        let take = max.min(fifo.count());
        let values = fifo.pop(take);
        self.release_values(&values);
        Some(values)
    }

    /// Peek at up to `count` of the oldest values without consuming them.
    ///
    /// The copies are transient keeper allocations: they are charged and
    /// immediately released, so a halted collector sees them as garbage.
    pub fn get(&mut self, linda: LindaId, key: &Key, count: usize) -> Vec<Value> {
        let Some(fifo) = self.keys_db(linda).get(key) else {
            return Vec::new();
        };
        let values = fifo.peek(count.min(fifo.count()));
        let bytes: usize = values.iter().map(Value::deep_size).sum();
        self.interp.charge(bytes);
        self.interp.release(bytes);
        values
    }

    /// Replace the contents of `(linda, key)` with exactly `values`.
    ///
    /// With zero values: an unlimited FIFO is removed outright, a limited
    /// one is reset (its limit is sticky). Returns true iff the FIFO went
    /// from full to not-full, i.e. blocked writers should be woken.
    pub fn set(&mut self, linda: LindaId, key: &Key, values: Vec<Value>) -> bool {
        if values.is_empty() {
            let db = self.keys_db(linda);
            // clearing a key that was never written is a no-op
            let Some(limit) = db.get(key).map(KeyFifo::limit) else {
                return false;
            };
            if limit == Limit::Unlimited {
                // the default limit: the whole slot can go away
                if let Some(removed) = db.remove(key) {
                    let discarded: Vec<Value> = removed.peek(removed.count());
                    self.release_values(&discarded);
                }
                return false;
            }
            let Some(fifo) = db.get_mut(key) else {
                return false;
            };
            let was_full = fifo.is_full();
            let discarded = fifo.reset();
            let now_full = fifo.is_full();
            self.release_values(&discarded);
            return was_full && !now_full;
        }

        let fifo = self.keys_db(linda).entry(key.clone()).or_insert_with(KeyFifo::new);
        let was_full = fifo.is_full();
        let discarded = fifo.reset();
        fifo.push(values);
        let now_full = fifo.is_full();
        self.release_values(&discarded);
        // no writer can be blocked on a key that didn't exist, so the
        // freshly-created case reports false via was_full
        was_full && !now_full
    }

    /// Install a limit on `(linda, key)`, creating the FIFO if needed.
    ///
    /// Returns true iff the FIFO went from full to not-full under the new
    /// limit.
    pub fn limit(&mut self, linda: LindaId, key: &Key, limit: Limit) -> bool {
        self.keys_db(linda)
            .entry(key.clone())
            .or_insert_with(KeyFifo::new)
            .set_limit(limit)
    }

    /// Pending-element counts for every key of this Linda.
    pub fn count_all(&mut self, linda: LindaId) -> HashMap<Key, usize> {
        self.keys_db(linda)
            .iter()
            .map(|(key, fifo)| (key.clone(), fifo.count()))
            .collect()
    }

    /// Pending-element count of one key, or None if the key is unknown.
    pub fn count_one(&mut self, linda: LindaId, key: &Key) -> Option<usize> {
        self.keys_db(linda).get(key).map(KeyFifo::count)
    }

    /// Counts restricted to the listed keys; unknown keys are omitted.
    pub fn count_listed(&mut self, linda: LindaId, keys: &[Key]) -> HashMap<Key, usize> {
        let db = self.keys_db(linda);
        keys.iter()
            .filter_map(|key| db.get(key).map(|fifo| (key.clone(), fifo.count())))
            .collect()
    }

    /// Remove this Linda's entry from the registry. Runs during channel
    /// destruction; never errors.
    pub fn clear(&mut self, linda: LindaId) {
        if let Some(db) = self.store.remove(&linda) {
            let bytes: usize = db
                .values()
                .map(|fifo| fifo.peek(fifo.count()).iter().map(Value::deep_size).sum::<usize>())
                .sum();
            self.interp.release(bytes);
        }
    }

    /// Drop every registry entry. Runs once, from pool shutdown.
    pub fn drain(&mut self) {
        let ids: Vec<LindaId> = self.store.keys().copied().collect();
        for id in ids {
            self.clear(id);
        }
    }

    /// Snapshot of this Linda's storage for `dump`, or None if it never
    /// stored anything.
    pub fn dump(&self, linda: LindaId) -> Option<Vec<DumpEntry>> {
        let db = self.store.get(&linda)?;
        Some(
            db.iter()
                .map(|(key, fifo)| {
                    (
                        key.clone(),
                        fifo.first(),
                        fifo.count(),
                        fifo.limit(),
                        fifo.peek(fifo.count()),
                    )
                })
                .collect(),
        )
    }

    /// Apply the pool's GC policy after a primitive.
    ///
    /// Called for every primitive except `clear` (which runs during channel
    /// destruction, where raising is forbidden).
    pub fn run_gc(&mut self, policy: GcPolicy) -> Result<()> {
        match policy {
            GcPolicy::Never => Ok(()),
            GcPolicy::Step => {
                self.interp.gc_step();
                Ok(())
            }
            GcPolicy::Threshold(threshold) => {
                if self.interp.usage() >= threshold {
                    self.interp.gc_collect();
                    let after = self.interp.usage();
                    if after > threshold {
                        return Err(Error::GcThresholdTooLow { needed: after });
                    }
                }
                Ok(())
            }
        }
    }
}
