// Zero-cost tracing macros for linda
//
// These macros forward to tracing when the `tracing` feature is enabled,
// and compile to nothing when disabled.

// -----------------------------------------------------------------------------
// trace! - Very verbose: blocking-loop iterations, wakeups, hot paths
// -----------------------------------------------------------------------------

#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!($($arg)*) }
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

// -----------------------------------------------------------------------------
// debug! - Intermediate values, decision points, useful for debugging
// -----------------------------------------------------------------------------

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) }
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

// -----------------------------------------------------------------------------
// warn! - Recoverable issues, things that might indicate problems
// -----------------------------------------------------------------------------

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) }
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

// Macros are made available via #[macro_use] on the module in lib.rs
