// src/worker.rs
//
// The channel layer only needs a narrow view of a worker: its private
// interpreter, its pending cancellation, and — while it is blocked inside a
// Linda operation — which condition it is waiting on. Spawning, joining and
// error propagation belong to the worker-lifecycle layer above this crate.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::interp::Interp;
use crate::linda::LindaCore;
use crate::types::{CancelCell, CancelRequest, LindaId, WaitSide};

/// Coarse execution state, readable by supervisors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum WorkerStatus {
    /// Executing (possibly inside a non-blocking Linda operation).
    Running = 0,
    /// Parked on a Linda condition variable.
    Waiting = 1,
}

/// What a blocked worker is waiting on: one side of one channel.
pub(crate) struct WaitTarget {
    pub(crate) linda: Arc<LindaCore>,
    pub(crate) side: WaitSide,
}

/// The shared, cross-thread face of a worker.
///
/// The worker-lifecycle layer clones this handle to observe and cancel the
/// worker; the channel layer updates it around every blocking wait.
#[derive(Default)]
pub struct WorkerHandle {
    cancel: CancelCell,
    status: AtomicU8,
    waiting_on: Mutex<Option<WaitTarget>>,
}

impl WorkerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pending cancellation request, if any.
    pub fn cancel_requested(&self) -> CancelRequest {
        self.cancel.get()
    }

    /// Post a cancellation request.
    ///
    /// With `wake`, a worker currently parked on a Linda condition variable
    /// is notified so it re-examines the request immediately instead of at
    /// its next natural wakeup.
    pub fn cancel(&self, req: CancelRequest, wake: bool) {
        self.cancel.set(req);
        if !wake {
            return;
        }
        if self.status() != WorkerStatus::Waiting {
            return;
        }
        let waiting_on = self
            .waiting_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = waiting_on.as_ref() {
            trace!("cancel wakes worker parked on {:?}", target.side);
            target.linda.signal(target.side);
        }
    }

    pub fn status(&self) -> WorkerStatus {
        match self.status.load(Ordering::Acquire) {
            1 => WorkerStatus::Waiting,
            _ => WorkerStatus::Running,
        }
    }

    /// The channel and side this worker is parked on, if it is parked.
    pub fn waiting_on(&self) -> Option<(LindaId, WaitSide)> {
        let waiting_on = self
            .waiting_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        waiting_on.as_ref().map(|t| (t.linda.id(), t.side))
    }

    /// Publish the wait target. Called with the keeper mutex held, right
    /// before parking on the condition variable.
    pub(crate) fn begin_wait(&self, target: WaitTarget) {
        *self
            .waiting_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(target);
        self.status.store(WorkerStatus::Waiting as u8, Ordering::Release);
    }

    /// Clear the wait target. Called with the keeper mutex re-acquired,
    /// right after the wait returns.
    pub(crate) fn end_wait(&self) {
        self.status.store(WorkerStatus::Running as u8, Ordering::Release);
        *self
            .waiting_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One worker thread's channel-facing context: its private interpreter plus
/// the shared handle.
pub struct Worker {
    pub(crate) interp: Interp,
    handle: Arc<WorkerHandle>,
}

impl Worker {
    pub fn new() -> Self {
        Worker {
            interp: Interp::new(),
            handle: Arc::new(WorkerHandle::new()),
        }
    }

    /// The shared handle, for supervisors to keep.
    pub fn handle(&self) -> &Arc<WorkerHandle> {
        &self.handle
    }

    /// This worker's private interpreter.
    pub fn interp(&self) -> &Interp {
        &self.interp
    }

    /// Equivalent of a script-side `cancel_test()`: is a cancellation
    /// pending on this worker?
    pub fn cancel_requested(&self) -> CancelRequest {
        self.handle.cancel_requested()
    }
}

impl Default for Worker {
    fn default() -> Self {
        Worker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_worker_is_running_and_uncancelled() {
        let worker = Worker::new();
        assert_eq!(worker.cancel_requested(), CancelRequest::None);
        assert_eq!(worker.handle().status(), WorkerStatus::Running);
        assert!(worker.handle().waiting_on().is_none());
    }

    #[test]
    fn cancel_flag_is_visible_through_the_handle() {
        let worker = Worker::new();
        let handle = worker.handle().clone();
        handle.cancel(CancelRequest::Soft, false);
        assert_eq!(worker.cancel_requested(), CancelRequest::Soft);
        handle.cancel(CancelRequest::None, false);
        assert_eq!(worker.cancel_requested(), CancelRequest::None);
    }

    #[test]
    fn cancel_with_wake_on_idle_worker_is_harmless() {
        let worker = Worker::new();
        worker.handle().cancel(CancelRequest::Hard, true);
        assert_eq!(worker.cancel_requested(), CancelRequest::Hard);
    }
}
