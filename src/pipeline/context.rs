//! Per-request shared state: auth, preloader context, query cache entries.
//!
//! # Design Decisions
//! - Snapshots are immutable `Arc`s: a route's loader keeps the context
//!   exactly as it stood at that route's turn, no matter what later
//!   preloaders merged afterwards
//! - Only the sequential preload step mutates the accumulator; the shared
//!   pieces handed to concurrent loaders are read-only or internally locked

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The authenticate collaborator's result, shared by every hook in a chain.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    user: Arc<Option<Value>>,
}

impl AuthState {
    /// No credentials were presented (or no route asked for any).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: Value) -> Self {
        Self {
            user: Arc::new(Some(user)),
        }
    }

    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref().as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// An immutable view of the accumulated preloader context.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    entries: Arc<Map<String, Value>>,
}

impl ContextSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The snapshot as a plain JSON object, for serialization.
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.as_ref().clone())
    }
}

/// The mutable accumulator behind the sequential preload step.
#[derive(Debug, Default)]
pub struct ContextAccumulator {
    merged: Map<String, Value>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one preloader's contribution. Object keys land in the shared
    /// context, later routes overriding earlier ones; anything non-object
    /// is dropped with a log line, matching the object-shaped contract.
    pub fn merge(&mut self, contribution: Value) {
        match contribution {
            Value::Object(entries) => {
                for (key, value) in entries {
                    self.merged.insert(key, value);
                }
            }
            Value::Null => {}
            other => {
                tracing::warn!(
                    kind = %json_kind(&other),
                    "preloader returned a non-object contribution; ignored"
                );
            }
        }
    }

    /// Freeze the current state. Later merges never touch earlier
    /// snapshots.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: Arc::new(self.merged.clone()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One dehydrated query-cache entry, emitted on the wire as part of the
/// `q` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub key: String,
    pub data: Value,
}

/// Collector loaders use to seed the client's query cache. One per request,
/// shared by every loader in the chain.
#[derive(Debug, Clone, Default)]
pub struct QueryRecorder {
    entries: Arc<Mutex<Vec<QueryEntry>>>,
}

impl QueryRecorder {
    /// Record a cache entry for the client. Re-recording a key replaces the
    /// earlier value.
    pub fn record(&self, key: impl Into<String>, data: Value) {
        let key = key.into();
        let mut entries = self.entries.lock().expect("query recorder mutex poisoned");
        if let Some(existing) = entries.iter_mut().find(|e| e.key == key) {
            existing.data = data;
        } else {
            entries.push(QueryEntry { key, data });
        }
    }

    pub fn drain(&self) -> Vec<QueryEntry> {
        self.entries
            .lock()
            .expect("query recorder mutex poisoned")
            .drain(..)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .expect("query recorder mutex poisoned")
            .is_empty()
    }
}
