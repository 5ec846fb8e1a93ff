//! Multi-key bounded blocking channels ("Lindas") between isolated
//! interpreter workers.
//!
//! Each worker thread owns a private interpreter; nothing is ever shared
//! between worker heaps. Cross-worker data goes through a Linda: values are
//! copied out of the sender's interpreter into a *keeper* — an auxiliary
//! interpreter owning the actual storage — and copied again into the
//! receiver's interpreter on the way out.
//!
//! ```text
//! ┌────────┐   send    ┌──────────────────┐  receive   ┌────────┐
//! │Worker A│ ────────► │  Keeper #g       │ ─────────► │Worker B│
//! │ interp │           │  mutex + interp  │            │ interp │
//! └────────┘           │  {key → fifo}    │            └────────┘
//!                      └──────────────────┘
//! ```
//!
//! A [`KeeperPool`] hosts a fixed set of keepers; every [`Linda`] is bound
//! to exactly one of them (its *group*) for life. One mutex per keeper
//! guards both the storage and the per-channel condition variables, so
//! blocking `send`/`receive` park and wake without ever racing the store.

#[macro_use]
mod macros;

pub mod error;
mod fifo;
pub mod interp;
mod keeper;
pub mod linda;
pub mod pool;
pub mod types;
pub mod value;
pub mod worker;

pub use error::{Error, Result};
pub use interp::Interp;
pub use linda::{Counts, GetOutcome, KeyDump, Linda, RecvOutcome, SendOutcome, StoreOutcome};
pub use pool::KeeperPool;
pub use types::{
    CancelCell, CancelHint, CancelRequest, GcPolicy, Limit, LindaId, PoolConfig, WaitSide,
};
pub use value::{FuncRef, Key, Sentinel, Table, Value};
pub use worker::{Worker, WorkerHandle, WorkerStatus};

#[cfg(test)]
mod proptests;
