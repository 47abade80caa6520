//! Render-side collaborators.
//!
//! # Responsibilities
//! - Give each route an opaque render seam (`props in, renderable out`)
//! - Merge per-route head objects root to leaf, child overriding parent
//! - Merge per-route response headers with the same override rule
//!
//! # Design Decisions
//! - Rendering itself is out of scope here; the trait only fixes the
//!   contract so a UI layer can plug in without touching the pipeline
//! - Head and header merges are shallow by key: a child that sets `title`
//!   replaces the parent's `title` wholesale

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Opaque per-route renderer. The pipeline never inspects the output; it
/// only carries it.
pub trait Render: Send + Sync {
    fn render(&self, props: &Value) -> Value;
}

impl<F> Render for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn render(&self, props: &Value) -> Value {
        (self)(props)
    }
}

/// Merge per-route head objects in chain order (root first). Later keys
/// override earlier ones; non-object entries are skipped.
pub fn merge_head<'a, I>(heads: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Map::new();
    for head in heads {
        if let Value::Object(entries) = head {
            for (key, value) in entries {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(merged)
}

/// Merge per-route response header maps in chain order, child overriding
/// parent. Header names are case-folded so overrides work regardless of
/// the hook author's casing.
pub fn merge_headers<'a, I>(maps: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a HashMap<String, String>>,
{
    let mut merged = HashMap::new();
    for map in maps {
        for (name, value) in map {
            merged.insert(name.to_ascii_lowercase(), value.clone());
        }
    }
    merged
}
