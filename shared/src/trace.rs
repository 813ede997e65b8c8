//! Named diagnostic values emitted by the protocol components.
//!
//! Every component reports its internals (buffer sizes, targets, dilations,
//! rollback counts) through a [`TraceSink`] passed in by the caller, so the
//! same code can feed the on-screen overlay, the log or a test assertion.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TraceValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl TraceValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TraceValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraceValue::Int(v) => Some(*v as f64),
            TraceValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Int(v) => write!(f, "{}", v),
            TraceValue::Float(v) => write!(f, "{:.3}", v),
            TraceValue::Bool(v) => write!(f, "{}", v),
            TraceValue::Text(v) => f.write_str(v),
        }
    }
}

macro_rules! int_trace_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for TraceValue {
                fn from(value: $ty) -> Self {
                    TraceValue::Int(value as i64)
                }
            }
        )*
    };
}

int_trace_value!(i8, i32, i64, u32, u64, usize);

impl From<f64> for TraceValue {
    fn from(value: f64) -> Self {
        TraceValue::Float(value)
    }
}

impl From<bool> for TraceValue {
    fn from(value: bool) -> Self {
        TraceValue::Bool(value)
    }
}

impl From<&str> for TraceValue {
    fn from(value: &str) -> Self {
        TraceValue::Text(value.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(value: String) -> Self {
        TraceValue::Text(value)
    }
}

pub trait TraceSink {
    fn record(&mut self, key: &str, value: TraceValue);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _key: &str, _value: TraceValue) {}
}

/// Forwards every value to `log::trace!`, prefixed with a component name.
#[derive(Debug, Clone)]
pub struct LogSink {
    prefix: String,
}

impl LogSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl TraceSink for LogSink {
    fn record(&mut self, key: &str, value: TraceValue) {
        log::trace!("{} {} = {}", self.prefix, key, value);
    }
}

/// Keeps the latest value per key.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    values: BTreeMap<String, TraceValue>,
    records: u64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TraceValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraceValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of `record` calls, including overwrites.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.records = 0;
    }
}

impl TraceSink for MemorySink {
    fn record(&mut self, key: &str, value: TraceValue) {
        self.records += 1;
        match self.values.get_mut(key) {
            Some(existing) => *existing = value,
            None => {
                self.values.insert(key.to_string(), value);
            }
        }
    }
}
