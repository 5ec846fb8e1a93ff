// src/types.rs

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Stable identity of a Linda channel: the address of its shared core.
///
/// Any number of handles may point at the same channel; they all carry the
/// same `LindaId`, which is also what keys the keeper registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LindaId(pub(crate) usize);

impl LindaId {
    /// Raw address value, for use as an opaque map key.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for LindaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Capacity bound of one per-key FIFO.
///
/// `Bounded(0)` is accepted and means "no send is ever admitted": every
/// sender blocks until the limit is raised or the send times out.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Limit {
    /// Sends never block on capacity.
    #[default]
    Unlimited,
    /// Sends block once `count` reaches this bound.
    Bounded(usize),
}

impl Limit {
    /// Is a FIFO holding `count` elements full under this limit?
    pub fn is_full(self, count: usize) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::Bounded(n) => count >= n,
        }
    }

    /// Can `n` more elements be admitted on top of `count`?
    ///
    /// A send is all-or-none: if the batch doesn't fit in its entirety,
    /// nothing is admitted.
    pub fn admits(self, count: usize, n: usize) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Bounded(cap) => count + n <= cap,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => write!(f, "unlimited"),
            Limit::Bounded(n) => write!(f, "{n}"),
        }
    }
}

/// Garbage-collection governance for keeper interpreters.
///
/// Keeper interpreters run with their collector halted: a collection inside
/// a keeper would stall every Linda sharing it. Instead, the protected-call
/// wrapper applies this policy after each primitive (except `clear`, which
/// runs during channel destruction and must never fail).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum GcPolicy {
    /// Never collect from the wrapper; the keeper collector runs normally.
    #[default]
    Never,
    /// One incremental step after each primitive.
    Step,
    /// Full collection once usage reaches this many bytes. If the live set
    /// alone exceeds the threshold, the operation fails with
    /// [`Error::GcThresholdTooLow`](crate::Error::GcThresholdTooLow).
    Threshold(usize),
}

/// Configuration for a keeper pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of keeper interpreters. `0` disables inter-worker
    /// communication entirely: every Linda operation reports `Disabled`.
    /// Default: 1
    pub nb_keepers: usize,

    /// GC governance applied after keeper primitives.
    /// Default: `GcPolicy::Never`
    pub gc: GcPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            nb_keepers: 1,
            gc: GcPolicy::Never,
        }
    }
}

/// A pending cancellation request, observed by blocking operations.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CancelRequest {
    /// No cancellation pending.
    #[default]
    None = 0,
    /// Blocked operations return a `Cancelled` outcome; no unwind.
    Soft = 1,
    /// Blocked operations fail with an error the caller must propagate.
    Hard = 2,
}

impl CancelRequest {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CancelRequest::Soft,
            2 => CancelRequest::Hard,
            _ => CancelRequest::None,
        }
    }

    /// First non-`None` of the two, `self` winning ties.
    pub(crate) fn or(self, other: CancelRequest) -> CancelRequest {
        if self != CancelRequest::None { self } else { other }
    }
}

/// Atomic cell holding a [`CancelRequest`].
///
/// Written by supervising threads, read inside blocking loops without any
/// additional locking.
#[derive(Debug, Default)]
pub struct CancelCell(AtomicU8);

impl CancelCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> CancelRequest {
        CancelRequest::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, req: CancelRequest) {
        self.0.store(req as u8, Ordering::Release);
    }
}

/// Which waiters a [`Linda::cancel`](crate::Linda::cancel) call should wake.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CancelHint {
    /// Wake blocked readers.
    Read,
    /// Wake blocked writers.
    Write,
    /// Wake everyone.
    #[default]
    Both,
    /// Clear a previously-set channel cancellation, waking no one.
    None,
}

/// The condition a blocked worker is waiting for.
///
/// Senders wait for a read to free capacity; receivers wait for a write to
/// provide data. Each side has its own condition variable on the channel so
/// the two populations never wake each other spuriously by design of the
/// signal routing (spurious wakeups from the platform are still tolerated).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WaitSide {
    /// Waiting on `read_happened` (a blocked sender).
    Read,
    /// Waiting on `write_happened` (a blocked receiver).
    Write,
}
