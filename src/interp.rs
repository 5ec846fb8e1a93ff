// src/interp.rs
//
// Each worker thread owns one private interpreter; keepers own auxiliary
// ones. Nothing is ever shared between two interpreters' heaps: values cross
// over through `transfer`, which materializes a fresh copy in the
// destination and charges its accounting.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{Table, Value};

/// One interpreter heap, reduced to what the channel layer needs to know
/// about it: byte accounting and collector state.
///
/// While the collector is halted (the keeper configuration), freed bytes
/// accrue as garbage instead of being reclaimed; the pool's
/// [`GcPolicy`](crate::GcPolicy) decides when that garbage is paid down.
#[derive(Debug)]
pub struct Interp {
    name: Option<String>,
    live: usize,
    garbage: usize,
    collector_halted: bool,
}

impl Interp {
    /// A fresh interpreter with its collector running.
    pub fn new() -> Self {
        Interp {
            name: None,
            live: 0,
            garbage: 0,
            collector_halted: false,
        }
    }

    /// A fresh named interpreter (keepers are named "Keeper #n").
    pub fn with_name(name: impl Into<String>) -> Self {
        Interp {
            name: Some(name.into()),
            ..Interp::new()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Halt the collector: from now on, frees accrue as garbage until
    /// [`gc_step`](Interp::gc_step) or [`gc_collect`](Interp::gc_collect)
    /// reclaims them.
    pub fn gc_stop(&mut self) {
        self.collector_halted = true;
    }

    /// Total heap usage: live bytes plus unreclaimed garbage.
    pub fn usage(&self) -> usize {
        self.live + self.garbage
    }

    /// Live bytes only (what a full collection cannot reduce below).
    pub fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn charge(&mut self, bytes: usize) {
        self.live += bytes;
    }

    pub(crate) fn release(&mut self, bytes: usize) {
        self.live = self.live.saturating_sub(bytes);
        if self.collector_halted {
            self.garbage += bytes;
        }
    }

    /// One incremental collection step: reclaims part of the garbage.
    pub(crate) fn gc_step(&mut self) {
        self.garbage -= self.garbage.div_ceil(2);
    }

    /// Full collection: reclaims all garbage.
    pub(crate) fn gc_collect(&mut self) {
        self.garbage = 0;
    }
}

impl Default for Interp {
    fn default() -> Self {
        Interp::new()
    }
}

/// Move `values` into `dst`, materializing copies in its heap.
///
/// All-or-none: the whole slice is validated before anything is copied, so a
/// failed transfer leaves `dst` untouched. Table aliasing within one call is
/// preserved (two references to one table come out as two references to one
/// copy). Function handles are interpreter-local and fail the transfer.
pub(crate) fn transfer(dst: &mut Interp, values: &[Value]) -> Result<Vec<Value>> {
    for v in values {
        ensure_portable(v)?;
    }

    let mut memo: HashMap<usize, Arc<Table>> = HashMap::new();
    let copied: Vec<Value> = values.iter().map(|v| copy_value(&mut memo, v)).collect();

    let bytes: usize = copied.iter().map(Value::deep_size).sum();
    dst.charge(bytes);
    Ok(copied)
}

fn ensure_portable(v: &Value) -> Result<()> {
    match v {
        Value::Func(_) => Err(Error::UnsupportedType),
        Value::Table(t) => {
            for (k, val) in &t.entries {
                ensure_portable(k)?;
                ensure_portable(val)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn copy_value(memo: &mut HashMap<usize, Arc<Table>>, v: &Value) -> Value {
    match v {
        Value::Str(s) => Value::Str(Arc::from(&**s)),
        Value::Table(t) => {
            let identity = Arc::as_ptr(t) as usize;
            if let Some(copy) = memo.get(&identity) {
                return Value::Table(copy.clone());
            }
            let entries = t
                .entries
                .iter()
                .map(|(k, val)| (copy_value(memo, k), copy_value(memo, val)))
                .collect();
            let copy = Arc::new(Table::new(entries));
            memo.insert(identity, copy.clone());
            Value::Table(copy)
        }
        flat => flat.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FuncRef;

    #[test]
    fn transfer_copies_values() {
        let mut dst = Interp::new();
        let src = vec![Value::Int(1), Value::str("abc"), Value::Bool(true)];
        let out = transfer(&mut dst, &src).unwrap();
        assert_eq!(out, src);
        assert!(dst.usage() > 0);
    }

    #[test]
    fn transfer_rebuilds_strings() {
        let mut dst = Interp::new();
        let s = Value::str("shared");
        let out = transfer(&mut dst, std::slice::from_ref(&s)).unwrap();
        let (Value::Str(a), Value::Str(b)) = (&s, &out[0]) else {
            panic!("expected strings");
        };
        assert!(!Arc::ptr_eq(a, b), "strings must not share heaps");
    }

    #[test]
    fn transfer_rejects_functions() {
        let mut dst = Interp::new();
        let err = transfer(&mut dst, &[Value::Func(FuncRef(7))]).unwrap_err();
        assert_eq!(err, Error::UnsupportedType);
        assert_eq!(dst.usage(), 0, "failed transfer must not charge anything");
    }

    #[test]
    fn transfer_rejects_functions_nested_in_tables() {
        let mut dst = Interp::new();
        let t = Value::table(vec![(Value::Int(1), Value::Func(FuncRef(7)))]);
        let err = transfer(&mut dst, &[Value::Int(1), t]).unwrap_err();
        assert_eq!(err, Error::UnsupportedType);
        assert_eq!(dst.usage(), 0);
    }

    #[test]
    fn transfer_preserves_aliasing_within_one_call() {
        let mut dst = Interp::new();
        let shared = Arc::new(Table::new(vec![(Value::Int(1), Value::Int(2))]));
        let src = vec![
            Value::Table(shared.clone()),
            Value::Table(shared.clone()),
        ];
        let out = transfer(&mut dst, &src).unwrap();
        let (Value::Table(a), Value::Table(b)) = (&out[0], &out[1]) else {
            panic!("expected tables");
        };
        assert!(Arc::ptr_eq(a, b), "aliasing must survive the copy");
        assert!(!Arc::ptr_eq(a, &shared), "but not point into the source heap");
    }

    #[test]
    fn release_with_running_collector_reclaims_immediately() {
        let mut interp = Interp::new();
        interp.charge(100);
        interp.release(100);
        assert_eq!(interp.usage(), 0);
    }

    #[test]
    fn release_with_halted_collector_accrues_garbage() {
        let mut interp = Interp::new();
        interp.gc_stop();
        interp.charge(100);
        interp.release(100);
        assert_eq!(interp.live(), 0);
        assert_eq!(interp.usage(), 100);

        interp.gc_step();
        assert_eq!(interp.usage(), 50);
        interp.gc_collect();
        assert_eq!(interp.usage(), 0);
    }

    #[test]
    fn gc_step_drains_odd_remainders() {
        let mut interp = Interp::new();
        interp.gc_stop();
        interp.charge(3);
        interp.release(3);
        interp.gc_step();
        interp.gc_step();
        assert_eq!(interp.usage(), 0, "repeated steps must reach zero");
    }
}
