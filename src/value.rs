// src/value.rs

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Reserved process-wide markers.
///
/// These are opaque singletons from the point of view of the host runtime:
/// scripts can pass them around and compare them, but they carry no data.
/// None of them is a valid FIFO key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sentinel {
    /// Stands in for a genuine nil inside keeper storage, so that nil
    /// survives the cross-heap copy (which drops trailing nils).
    Nil,
    /// Marker selecting batched-receive mode in dynamically-typed host
    /// bindings. The Rust surface uses
    /// [`Linda::receive_batched`](crate::Linda::receive_batched) instead,
    /// but the marker stays reserved.
    Batch,
    /// Soft-cancellation outcome marker.
    Cancel,
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentinel::Nil => write!(f, "<nil-sentinel>"),
            Sentinel::Batch => write!(f, "<batch-sentinel>"),
            Sentinel::Cancel => write!(f, "<cancel-error>"),
        }
    }
}

/// Opaque handle to a function living in some worker's interpreter.
///
/// Functions are meaningful only inside their owning interpreter, so any
/// attempt to move one through a Linda fails with
/// [`Error::UnsupportedType`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FuncRef(pub u64);

/// A composite value: an ordered sequence of key/value pairs.
///
/// Tables are shared by reference inside one interpreter (`Arc` identity);
/// crossing a Linda deep-copies them, preserving aliasing within one call.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Table {
    pub entries: Vec<(Value, Value)>,
}

impl Table {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        Table { entries }
    }
}

/// The neutral value representation exchanged between worker interpreters.
#[derive(Clone, PartialEq, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(Arc<str>),
    /// Composite; aliasing is identity (see [`Table`]).
    Table(Arc<Table>),
    /// Opaque pointer-sized token. Portable: it designates no heap.
    Ptr(usize),
    /// Interpreter-local function handle. Not portable.
    Func(FuncRef),
    /// One of the reserved markers.
    Marker(Sentinel),
}

impl Value {
    /// Convenience constructor for string values.
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Convenience constructor for table values.
    pub fn table(entries: Vec<(Value, Value)>) -> Value {
        Value::Table(Arc::new(Table::new(entries)))
    }

    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Ptr(_) => "pointer",
            Value::Func(_) => "function",
            Value::Marker(_) => "sentinel",
        }
    }

    /// Approximate heap footprint, for interpreter accounting.
    ///
    /// Aliased tables are counted once per reference on purpose: the
    /// accounting tracks what a transfer would materialize, not graph
    /// minimality.
    pub fn deep_size(&self) -> usize {
        const SLOT: usize = std::mem::size_of::<Value>();
        match self {
            Value::Str(s) => SLOT + s.len(),
            Value::Table(t) => {
                SLOT + t
                    .entries
                    .iter()
                    .map(|(k, v)| k.deep_size() + v.deep_size())
                    .sum::<usize>()
            }
            _ => SLOT,
        }
    }

    /// Substitution applied to top-level values on their way into a keeper:
    /// a genuine nil becomes the nil sentinel so FIFO slots can hold it.
    pub(crate) fn into_keeper(self) -> Value {
        match self {
            Value::Nil => Value::Marker(Sentinel::Nil),
            other => other,
        }
    }

    /// Back-substitution applied on the way out of a keeper.
    pub(crate) fn from_keeper(self) -> Value {
        match self {
            Value::Marker(Sentinel::Nil) => Value::Nil,
            other => other,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

/// A FIFO key: the flat subset of [`Value`] usable to address a slot.
///
/// Floats are stored as their ordered bit pattern so keys are `Eq + Hash`;
/// NaN keys are rejected at construction. The reserved sentinels are not
/// representable here, which is what enforces their rejection as keys.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Key {
    Bool(bool),
    Int(i64),
    /// Bit pattern of a non-NaN f64.
    Num(u64),
    Str(Arc<str>),
    Ptr(usize),
}

impl Key {
    /// Convenience constructor for string keys.
    pub fn str(s: impl AsRef<str>) -> Key {
        Key::Str(Arc::from(s.as_ref()))
    }

    /// Build a key from a float. Fails on NaN.
    pub fn num(n: f64) -> Result<Key> {
        if n.is_nan() {
            return Err(Error::invalid_argument("NaN is not a valid key"));
        }
        Ok(Key::Num(n.to_bits()))
    }

    /// Validate a value as a key.
    ///
    /// Accepted: boolean, number, string, opaque pointer. Everything else
    /// (nil, tables, functions, and the reserved sentinels in particular)
    /// is an argument error.
    pub fn from_value(v: &Value) -> Result<Key> {
        match v {
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Num(n) => Key::num(*n),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            Value::Ptr(p) => Ok(Key::Ptr(*p)),
            other => Err(Error::invalid_argument(format!(
                "invalid key type (not a boolean, string, number or pointer): {}",
                other.type_name()
            ))),
        }
    }

    /// The key as a plain value, for returning `(key, value)` pairs.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Num(bits) => Value::Num(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Ptr(p) => Value::Ptr(*p),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Num(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Key::Str(s) => write!(f, "{s:?}"),
            Key::Ptr(p) => write!(f, "{p:#x}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Key {
        Key::Int(i)
    }
}
