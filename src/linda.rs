// src/linda.rs
//
// The user-facing channel object. A Linda is a cheap handle onto a shared
// core; the core knows its keeper (via pool + group) and carries the two
// condition variables blocked workers park on. All storage lives in the
// keeper — the Linda itself holds no values, which is why any number of
// workers can hold handles without sharing heaps.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::interp::transfer;
use crate::keeper::KeeperState;
use crate::pool::KeeperPool;
use crate::types::{CancelHint, CancelRequest, Limit, LindaId, WaitSide};
use crate::value::{Key, Value};
use crate::worker::{WaitTarget, Worker, WorkerHandle};

/// Outcome of a [`Linda::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// All values were queued atomically.
    Queued,
    /// The deadline expired while the key was at its limit.
    TimedOut,
    /// A soft cancellation ended the wait.
    Cancelled,
    /// The pool is closing or has no keepers; nothing happened.
    Disabled,
}

/// Outcome of a [`Linda::receive`] / [`Linda::receive_batched`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecvOutcome {
    /// One value (plain receive) or `min..=max` values (batched), popped
    /// from `key` in send order.
    Received { key: Key, values: Vec<Value> },
    /// The deadline expired with nothing to consume.
    TimedOut,
    /// A soft cancellation ended the wait.
    Cancelled,
    /// The pool is closing or has no keepers; nothing happened.
    Disabled,
}

/// Outcome of a [`Linda::set`] / [`Linda::limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The operation applied. `wake_writers` reports the full-to-not-full
    /// transition (blocked senders were notified).
    Done { wake_writers: bool },
    /// The channel is soft-cancelled; nothing happened.
    Cancelled,
    /// The pool is closing or has no keepers; nothing happened.
    Disabled,
}

/// Outcome of a [`Linda::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum GetOutcome {
    /// Up to `count` of the oldest values, not consumed. Empty when the key
    /// is unknown or holds nothing.
    Values(Vec<Value>),
    /// The channel is soft-cancelled; nothing was read.
    Cancelled,
    /// The pool is closing or has no keepers.
    Disabled,
}

/// Result shape of [`Linda::count`].
#[derive(Debug, Clone, PartialEq)]
pub enum Counts {
    /// No key given: every key of this channel with its pending count.
    All(HashMap<Key, usize>),
    /// One key given: its count, or None if the key is unknown.
    One(Option<usize>),
    /// Several keys given: counts restricted to the known ones.
    Listed(HashMap<Key, usize>),
    /// The pool is closing or has no keepers.
    Disabled,
}

/// Per-key snapshot returned by [`Linda::dump`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDump {
    /// 1-based index of the oldest element.
    pub first: usize,
    /// Number of pending elements.
    pub count: usize,
    /// Capacity bound.
    pub limit: Limit,
    /// Pending values, oldest first.
    pub fifo: Vec<Value>,
}

const INLINE_NAME_LEN: usize = 23;

/// Short names are embedded in the core, longer ones go to the heap. A
/// storage distinction only; both read back identically.
enum LindaName {
    None,
    Inline { len: u8, buf: [u8; INLINE_NAME_LEN] },
    Heap(Box<str>),
}

impl LindaName {
    fn new(name: Option<&str>) -> Self {
        match name {
            None | Some("") => LindaName::None,
            Some(s) if s.len() <= INLINE_NAME_LEN => {
                let mut buf = [0u8; INLINE_NAME_LEN];
                buf[..s.len()].copy_from_slice(s.as_bytes());
                LindaName::Inline {
                    len: s.len() as u8,
                    buf,
                }
            }
            Some(s) => LindaName::Heap(s.into()),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            LindaName::None => None,
            LindaName::Inline { len, buf } => {
                std::str::from_utf8(&buf[..*len as usize]).ok()
            }
            LindaName::Heap(s) => Some(s),
        }
    }
}

pub(crate) struct LindaCore {
    pool: Arc<KeeperPool>,
    group: usize,
    name: LindaName,
    /// Signalled whenever a value leaves storage (or capacity otherwise
    /// appears); blocked senders wait here.
    pub(crate) read_happened: Condvar,
    /// Signalled whenever a value enters storage; blocked receivers wait
    /// here.
    pub(crate) write_happened: Condvar,
    cancel: crate::types::CancelCell,
}

impl LindaCore {
    /// Stable identity: the core's address. Keys the keeper registry.
    pub(crate) fn id(&self) -> LindaId {
        LindaId(self as *const LindaCore as usize)
    }

    pub(crate) fn signal(&self, side: WaitSide) {
        match side {
            WaitSide::Read => self.read_happened.notify_all(),
            WaitSide::Write => self.write_happened.notify_all(),
        }
    }
}

impl Drop for LindaCore {
    fn drop(&mut self) {
        // Last handle gone: remove our storage from the keeper registry.
        // During pool shutdown there is no keeper to acquire and nothing to
        // clean; skipping is what keeps late finalizers from deadlocking.
        if let Some(keeper) = self.pool.which_keeper(self.group) {
            keeper.lock().clear(self.id());
        }
    }
}

/// A named, multi-key, bounded blocking channel between workers.
///
/// Handles are cheap to clone and safe to share across threads; they all
/// designate the same storage. Construct through
/// [`KeeperPool::new_linda`](crate::KeeperPool::new_linda).
#[derive(Clone)]
pub struct Linda {
    core: Arc<LindaCore>,
}

impl Linda {
    pub(crate) fn new(pool: Arc<KeeperPool>, name: Option<&str>, group: usize) -> Self {
        Linda {
            core: Arc::new(LindaCore {
                pool,
                group,
                name: LindaName::new(name),
                read_happened: Condvar::new(),
                write_happened: Condvar::new(),
                cancel: crate::types::CancelCell::new(),
            }),
        }
    }

    /// The channel's stable identity ("deep" pointer): equal across every
    /// handle to the same channel, distinct between channels.
    pub fn id(&self) -> LindaId {
        self.core.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.core.name.as_str()
    }

    /// The keeper group this channel is bound to.
    pub fn group(&self) -> usize {
        self.core.group
    }

    /// Queue `values` on `key`, blocking while the key is at its limit.
    ///
    /// `timeout` of `None` waits forever; `Some(Duration::ZERO)` makes one
    /// non-blocking attempt. The batch lands atomically or not at all.
    pub fn send(
        &self,
        worker: &Worker,
        timeout: Option<Duration>,
        key: Key,
        values: &[Value],
    ) -> Result<SendOutcome> {
        if values.is_empty() {
            return Err(Error::invalid_argument("no data to send"));
        }
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(SendOutcome::Disabled);
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        let outbound: Vec<Value> = values.iter().cloned().map(Value::into_keeper).collect();
        let gc = core.pool.gc_policy();

        let mut cancel;
        let mut queued = false;
        {
            let mut state = keeper.lock();
            let mut try_again = true;
            loop {
                cancel = effective_cancel(worker.handle(), core);
                if !try_again || cancel != CancelRequest::None {
                    break;
                }

                let copied = transfer(&mut state.interp, &outbound)?;
                let ok = state.send(core.id(), &key, copied);
                state.run_gc(gc)?;
                if ok {
                    core.write_happened.notify_all();
                    queued = true;
                    break;
                }

                // storage full: wait until a read makes room, or we time out
                let remaining = match deadline {
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            break;
                        }
                        Some(d - now)
                    }
                    None => None,
                };
                trace!("send blocked on key {key}, waiting for readers");
                worker.handle().begin_wait(WaitTarget {
                    linda: self.core.clone(),
                    side: WaitSide::Read,
                });
                let (guard, timed_out) = wait_on(&core.read_happened, state, remaining);
                state = guard;
                worker.handle().end_wait();
                try_again = !timed_out;
            }
        }

        match cancel {
            CancelRequest::Soft => Ok(SendOutcome::Cancelled),
            CancelRequest::Hard => Err(Error::Cancelled),
            CancelRequest::None => Ok(if queued {
                SendOutcome::Queued
            } else {
                SendOutcome::TimedOut
            }),
        }
    }

    /// Pop one value from the first non-empty of `keys` (scanned left to
    /// right), blocking while all of them are empty.
    pub fn receive(
        &self,
        worker: &mut Worker,
        timeout: Option<Duration>,
        keys: &[Key],
    ) -> Result<RecvOutcome> {
        if keys.is_empty() {
            return Err(Error::invalid_argument("no key to receive from"));
        }
        self.receive_inner(worker, timeout, RecvMode::Any(keys))
    }

    /// Pop between `min` and `max` values from `key`, blocking until at
    /// least `min` are available. `max` defaults to `min`.
    pub fn receive_batched(
        &self,
        worker: &mut Worker,
        timeout: Option<Duration>,
        key: Key,
        min: usize,
        max: Option<usize>,
    ) -> Result<RecvOutcome> {
        let max = max.unwrap_or(min);
        if min < 1 || min > max {
            return Err(Error::invalid_argument("batched min/max error"));
        }
        self.receive_inner(worker, timeout, RecvMode::Batched { key, min, max })
    }

    fn receive_inner(
        &self,
        worker: &mut Worker,
        timeout: Option<Duration>,
        mode: RecvMode<'_>,
    ) -> Result<RecvOutcome> {
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(RecvOutcome::Disabled);
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        let gc = core.pool.gc_policy();

        let mut cancel;
        let mut received: Option<(Key, Vec<Value>)> = None;
        {
            let mut state = keeper.lock();
            let mut try_again = true;
            loop {
                cancel = effective_cancel(worker.handle(), core);
                if !try_again || cancel != CancelRequest::None {
                    break;
                }

                let popped = match &mode {
                    RecvMode::Any(keys) => {
                        state.receive(core.id(), keys).map(|(k, v)| (k, vec![v]))
                    }
                    RecvMode::Batched { key, min, max } => state
                        .receive_batched(core.id(), key, *min, *max)
                        .map(|values| (key.clone(), values)),
                };
                state.run_gc(gc)?;
                if let Some((key, values)) = popped {
                    let values = transfer(&mut worker.interp, &values)?
                        .into_iter()
                        .map(Value::from_keeper)
                        .collect();
                    core.read_happened.notify_all();
                    received = Some((key, values));
                    break;
                }

                // nothing to consume: wait until a write lands, or time out
                let remaining = match deadline {
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            break;
                        }
                        Some(d - now)
                    }
                    None => None,
                };
                trace!("receive blocked, waiting for writers");
                worker.handle().begin_wait(WaitTarget {
                    linda: self.core.clone(),
                    side: WaitSide::Write,
                });
                let (guard, timed_out) = wait_on(&core.write_happened, state, remaining);
                state = guard;
                worker.handle().end_wait();
                try_again = !timed_out;
            }
        }

        match cancel {
            CancelRequest::Soft => Ok(RecvOutcome::Cancelled),
            CancelRequest::Hard => Err(Error::Cancelled),
            CancelRequest::None => Ok(match received {
                Some((key, values)) => RecvOutcome::Received { key, values },
                None => RecvOutcome::TimedOut,
            }),
        }
    }

    /// Replace the contents of `key` with exactly `values` (queued entries
    /// are discarded). With no values, the key is emptied — and removed
    /// outright if it never had a limit.
    pub fn set(&self, key: Key, values: &[Value]) -> Result<StoreOutcome> {
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(StoreOutcome::Disabled);
        };
        if core.cancel.get() != CancelRequest::None {
            return Ok(StoreOutcome::Cancelled);
        }
        let has_value = !values.is_empty();
        let outbound: Vec<Value> = values.iter().cloned().map(Value::into_keeper).collect();

        let wake_writers;
        {
            let mut state = keeper.lock();
            let copied = transfer(&mut state.interp, &outbound)?;
            wake_writers = state.set(core.id(), &key, copied);
            state.run_gc(core.pool.gc_policy())?;
            if has_value {
                // readers may now have data
                core.write_happened.notify_all();
            }
            if wake_writers {
                // the key was full and no longer is
                core.read_happened.notify_all();
            }
        }
        Ok(StoreOutcome::Done { wake_writers })
    }

    /// Read up to `count` of the oldest values of `key` without consuming
    /// them. `count` must be at least 1.
    pub fn get(&self, worker: &mut Worker, key: Key, count: usize) -> Result<GetOutcome> {
        if count < 1 {
            return Err(Error::invalid_argument("count should be >= 1"));
        }
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(GetOutcome::Disabled);
        };
        if core.cancel.get() != CancelRequest::None {
            return Ok(GetOutcome::Cancelled);
        }

        let values = {
            let mut state = keeper.lock();
            let values = state.get(core.id(), &key, count);
            state.run_gc(core.pool.gc_policy())?;
            transfer(&mut worker.interp, &values)?
        };
        Ok(GetOutcome::Values(
            values.into_iter().map(Value::from_keeper).collect(),
        ))
    }

    /// Install a capacity bound on `key` (creating the key if needed).
    /// Blocked senders are woken when the new bound un-fills the key.
    pub fn limit(&self, key: Key, limit: Limit) -> Result<StoreOutcome> {
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(StoreOutcome::Disabled);
        };
        if core.cancel.get() != CancelRequest::None {
            return Ok(StoreOutcome::Cancelled);
        }

        let wake_writers;
        {
            let mut state = keeper.lock();
            wake_writers = state.limit(core.id(), &key, limit);
            state.run_gc(core.pool.gc_policy())?;
            if wake_writers {
                core.read_happened.notify_all();
            }
        }
        Ok(StoreOutcome::Done { wake_writers })
    }

    /// Pending-element counts; see [`Counts`] for the three shapes.
    pub fn count(&self, keys: &[Key]) -> Result<Counts> {
        let core = &self.core;
        let Some(keeper) = core.pool.which_keeper(core.group) else {
            return Ok(Counts::Disabled);
        };
        let mut state = keeper.lock();
        let counts = match keys {
            [] => Counts::All(state.count_all(core.id())),
            [key] => Counts::One(state.count_one(core.id(), key)),
            keys => Counts::Listed(state.count_listed(core.id(), keys)),
        };
        state.run_gc(core.pool.gc_policy())?;
        Ok(counts)
    }

    /// Cancel the channel: pending and future blocking operations observe a
    /// soft cancellation, and the hinted waiter populations are woken.
    /// `CancelHint::None` clears the request instead.
    pub fn cancel(&self, hint: CancelHint) {
        let core = &self.core;
        match hint {
            CancelHint::None => {
                core.cancel.set(CancelRequest::None);
                return;
            }
            CancelHint::Read => {
                core.cancel.set(CancelRequest::Soft);
                core.write_happened.notify_all();
            }
            CancelHint::Write => {
                core.cancel.set(CancelRequest::Soft);
                core.read_happened.notify_all();
            }
            CancelHint::Both => {
                core.cancel.set(CancelRequest::Soft);
                core.write_happened.notify_all();
                core.read_happened.notify_all();
            }
        }
        debug!("linda {} cancelled ({hint:?})", self.core.id());
    }

    /// Snapshot every key's storage, for debugging. None when the channel
    /// never stored anything or the pool is closing.
    pub fn dump(&self, worker: &mut Worker) -> Option<HashMap<Key, KeyDump>> {
        let core = &self.core;
        let keeper = core.pool.which_keeper(core.group)?;
        let entries = keeper.lock().dump(core.id())?;

        let mut out = HashMap::with_capacity(entries.len());
        for (key, first, count, limit, fifo) in entries {
            // stored values are portable by construction
            let fifo = transfer(&mut worker.interp, &fifo)
                .ok()?
                .into_iter()
                .map(Value::from_keeper)
                .collect();
            out.insert(key, KeyDump { first, count, limit, fifo });
        }
        Some(out)
    }
}

impl fmt::Display for Linda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Linda: {name}"),
            None => write!(f, "Linda: {}", self.id()),
        }
    }
}

impl fmt::Debug for Linda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linda")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("group", &self.group())
            .finish()
    }
}

enum RecvMode<'k> {
    /// Scan several keys, pop a single value from the first non-empty one.
    Any(&'k [Key]),
    /// Pop a batch from a single key.
    Batched { key: Key, min: usize, max: usize },
}

fn effective_cancel(worker: &WorkerHandle, core: &LindaCore) -> CancelRequest {
    // the worker's own request dominates the channel-level one
    worker.cancel_requested().or(core.cancel.get())
}

/// Park on `cv`, atomically releasing and re-acquiring the keeper mutex.
/// Returns the re-acquired guard and whether the deadline expired; spurious
/// wakeups report false and the caller loops.
fn wait_on<'k>(
    cv: &Condvar,
    guard: MutexGuard<'k, KeeperState>,
    timeout: Option<Duration>,
) -> (MutexGuard<'k, KeeperState>, bool) {
    match timeout {
        None => (cv.wait(guard).unwrap_or_else(PoisonError::into_inner), false),
        Some(t) => {
            let (guard, result) = cv
                .wait_timeout(guard, t)
                .unwrap_or_else(PoisonError::into_inner);
            (guard, result.timed_out())
        }
    }
}
