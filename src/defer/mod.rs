//! Deferred loader values.
//!
//! # Responsibilities
//! - Register named async computations started from inside a loader
//! - Decide await-vs-stream per value (explicit flag, then navigation
//!   trigger, then the route's disable-defer flag)
//! - Hand loaders a lightweight JSON marker to embed in their output
//! - Settle awaited values before the response and record results back
//!   onto the markers
//! - Surface streamed values for late chunk emission
//!
//! # Design Decisions
//! - Computations are spawned at registration, so a streamed value makes
//!   progress while the eager part of the response is being written
//! - Each value settles exactly once; the join handle moves out of the
//!   entry when consumed
//! - Markers are plain JSON (`{"$defer": {"id", "key"}}`) so loader data
//!   stays serializable without special casing

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Whether a deferred value blocks the response or streams after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferMode {
    /// Settled before the eager frames are emitted.
    Await,
    /// Emitted later as a chunk frame, in resolution order.
    Stream,
}

/// What kind of request started the current pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    /// The very first page load.
    InitialLoad,
    /// A client-side navigation against an already-hydrated page.
    ClientNavigation,
}

impl NavigationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationTrigger::InitialLoad => "initial",
            NavigationTrigger::ClientNavigation => "navigate",
        }
    }
}

/// Resolve the effective mode for one deferred value.
///
/// Priority: an explicit `stream` flag on the call wins; client-side
/// navigations default to streaming; first loads follow the route's
/// disable-defer flag (disabled means stream, the enabled default means
/// await).
pub fn resolve_mode(
    explicit_stream: Option<bool>,
    trigger: NavigationTrigger,
    defer_disabled: bool,
) -> DeferMode {
    match explicit_stream {
        Some(true) => DeferMode::Stream,
        Some(false) => DeferMode::Await,
        None => match trigger {
            NavigationTrigger::ClientNavigation => DeferMode::Stream,
            NavigationTrigger::InitialLoad => {
                if defer_disabled {
                    DeferMode::Stream
                } else {
                    DeferMode::Await
                }
            }
        },
    }
}

type Computation = JoinHandle<Result<Value, String>>;

struct DeferEntry {
    id: u64,
    key: String,
    mode: DeferMode,
    handle: Option<Computation>,
    settled: Option<Result<Value, String>>,
}

struct RegistryInner {
    match_id: String,
    trigger: NavigationTrigger,
    defer_disabled: bool,
    next_id: AtomicU64,
    entries: Mutex<Vec<DeferEntry>>,
}

/// Per-route set of deferred values. Cloning shares the underlying set;
/// the clone handed to a loader is its defer handle.
#[derive(Clone)]
pub struct DeferRegistry {
    inner: Arc<RegistryInner>,
}

/// A streamed value detached from its registry, ready to be settled for
/// chunk emission.
pub struct StreamedDefer {
    /// Identity of the match that registered the value.
    pub match_id: String,
    pub key: String,
    handle: Option<Computation>,
    settled: Option<Result<Value, String>>,
}

/// A settled streamed value, ready to serialize as a chunk.
#[derive(Debug)]
pub struct ChunkResult {
    pub match_id: String,
    pub key: String,
    pub result: Result<Value, String>,
}

impl StreamedDefer {
    /// Wait for the value (or return the already-settled result).
    pub async fn settle(self) -> ChunkResult {
        let result = match (self.settled, self.handle) {
            (Some(result), _) => result,
            (None, Some(handle)) => match handle.await {
                Ok(result) => result,
                Err(err) => Err(format!("deferred task failed: {err}")),
            },
            (None, None) => Err("deferred value was never started".to_string()),
        };
        ChunkResult {
            match_id: self.match_id,
            key: self.key,
            result,
        }
    }
}

impl DeferRegistry {
    pub fn new(
        match_id: impl Into<String>,
        trigger: NavigationTrigger,
        defer_disabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                match_id: match_id.into(),
                trigger,
                defer_disabled,
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The identity of the match this registry belongs to.
    pub fn match_id(&self) -> &str {
        &self.inner.match_id
    }

    /// Register a named computation and get back its marker value.
    ///
    /// The computation is spawned immediately. The returned marker is what
    /// the loader should embed in its output where the value will appear.
    pub fn defer<F, E>(&self, key: impl Into<String>, stream: Option<bool>, fut: F) -> Value
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mode = resolve_mode(stream, self.inner.trigger, self.inner.defer_disabled);
        let handle = tokio::spawn(async move { fut.await.map_err(|e| e.to_string()) });

        tracing::debug!(
            match_id = %self.inner.match_id,
            key = %key,
            mode = ?mode,
            "deferred value registered"
        );

        self.inner
            .entries
            .lock()
            .expect("defer registry mutex poisoned")
            .push(DeferEntry {
                id,
                key: key.clone(),
                mode,
                handle: Some(handle),
                settled: None,
            });

        json!({ "$defer": { "id": id, "key": key } })
    }

    /// Settle every await-mode value; their results become available to
    /// [`apply_settled`](Self::apply_settled).
    pub async fn settle_awaited(&self) {
        self.settle(Some(DeferMode::Await)).await;
    }

    /// Settle everything, streamed values included. Used for responses
    /// that cannot stream.
    pub async fn settle_all(&self) {
        self.settle(None).await;
    }

    async fn settle(&self, only: Option<DeferMode>) {
        // Take handles out under the lock, await them outside it.
        let pending: Vec<(usize, Computation)> = {
            let mut entries = self
                .inner
                .entries
                .lock()
                .expect("defer registry mutex poisoned");
            entries
                .iter_mut()
                .enumerate()
                .filter(|(_, e)| only.is_none_or(|mode| e.mode == mode))
                .filter_map(|(idx, e)| e.handle.take().map(|h| (idx, h)))
                .collect()
        };

        for (idx, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(format!("deferred task failed: {err}")),
            };
            let mut entries = self
                .inner
                .entries
                .lock()
                .expect("defer registry mutex poisoned");
            entries[idx].settled = Some(result);
        }
    }

    /// Rewrite markers inside `data` with the settled results, so the
    /// serialized output carries resolved values without re-awaiting.
    pub fn apply_settled(&self, data: &mut Value) {
        let settled: HashMap<u64, Result<Value, String>> = {
            let entries = self
                .inner
                .entries
                .lock()
                .expect("defer registry mutex poisoned");
            entries
                .iter()
                .filter_map(|e| e.settled.clone().map(|r| (e.id, r)))
                .collect()
        };
        if !settled.is_empty() {
            substitute(data, &settled);
        }
    }

    /// Detach every still-unsettled stream-mode value for chunk emission.
    pub fn take_streaming(&self) -> Vec<StreamedDefer> {
        let mut entries = self
            .inner
            .entries
            .lock()
            .expect("defer registry mutex poisoned");
        let mut taken = Vec::new();
        entries.retain_mut(|e| {
            if e.mode == DeferMode::Stream {
                taken.push(StreamedDefer {
                    match_id: self.inner.match_id.clone(),
                    key: e.key.clone(),
                    handle: e.handle.take(),
                    settled: e.settled.take(),
                });
                false
            } else {
                true
            }
        });
        taken
    }

    /// True if any stream-mode value is registered.
    pub fn has_streaming(&self) -> bool {
        self.inner
            .entries
            .lock()
            .expect("defer registry mutex poisoned")
            .iter()
            .any(|e| e.mode == DeferMode::Stream)
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .entries
            .lock()
            .expect("defer registry mutex poisoned")
            .is_empty()
    }
}

fn substitute(value: &mut Value, settled: &HashMap<u64, Result<Value, String>>) {
    match value {
        Value::Object(map) => {
            let marker_id = map
                .get("$defer")
                .and_then(|m| m.get("id"))
                .and_then(Value::as_u64);
            if let Some(id) = marker_id {
                if let Some(result) = settled.get(&id) {
                    if let Some(Value::Object(marker)) = map.get_mut("$defer") {
                        match result {
                            Ok(data) => {
                                marker.insert("data".to_string(), data.clone());
                            }
                            Err(message) => {
                                marker.insert(
                                    "error".to_string(),
                                    json!({ "message": message }),
                                );
                            }
                        }
                    }
                }
                return;
            }
            for v in map.values_mut() {
                substitute(v, settled);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                substitute(v, settled);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_priority() {
        // Explicit flag always wins.
        assert_eq!(
            resolve_mode(Some(true), NavigationTrigger::InitialLoad, false),
            DeferMode::Stream
        );
        assert_eq!(
            resolve_mode(Some(false), NavigationTrigger::ClientNavigation, true),
            DeferMode::Await
        );
        // Client navigations stream by default.
        assert_eq!(
            resolve_mode(None, NavigationTrigger::ClientNavigation, false),
            DeferMode::Stream
        );
        // First load follows the disable-defer flag.
        assert_eq!(
            resolve_mode(None, NavigationTrigger::InitialLoad, false),
            DeferMode::Await
        );
        assert_eq!(
            resolve_mode(None, NavigationTrigger::InitialLoad, true),
            DeferMode::Stream
        );
    }

    #[tokio::test]
    async fn test_awaited_value_recorded_on_marker() {
        let registry = DeferRegistry::new("/page:{}:[]", NavigationTrigger::InitialLoad, false);
        let marker = registry.defer("stats", None, async {
            Ok::<_, String>(json!({ "visits": 42 }))
        });

        let mut data = json!({ "title": "dashboard", "stats": marker });
        registry.settle_awaited().await;
        registry.apply_settled(&mut data);

        assert_eq!(data["stats"]["$defer"]["key"], "stats");
        assert_eq!(data["stats"]["$defer"]["data"]["visits"], 42);
        assert!(!registry.has_streaming());
    }

    #[tokio::test]
    async fn test_failed_value_recorded_as_error() {
        let registry = DeferRegistry::new("/page:{}:[]", NavigationTrigger::InitialLoad, false);
        let marker = registry.defer("broken", Some(false), async {
            Err::<Value, _>("backend unavailable")
        });

        let mut data = json!({ "broken": marker });
        registry.settle_awaited().await;
        registry.apply_settled(&mut data);

        assert_eq!(
            data["broken"]["$defer"]["error"]["message"],
            "backend unavailable"
        );
    }

    #[tokio::test]
    async fn test_streamed_values_detach() {
        let registry = DeferRegistry::new("/page:{}:[]", NavigationTrigger::InitialLoad, false);
        let marker = registry.defer("feed", Some(true), async { Ok::<_, String>(json!([1, 2])) });

        // Awaiting must not consume stream-mode values.
        registry.settle_awaited().await;
        let mut data = json!({ "feed": marker });
        registry.apply_settled(&mut data);
        assert!(data["feed"]["$defer"].get("data").is_none());

        let streamed = registry.take_streaming();
        assert_eq!(streamed.len(), 1);
        assert!(registry.is_empty());

        let chunk = streamed.into_iter().next().unwrap().settle().await;
        assert_eq!(chunk.match_id, "/page:{}:[]");
        assert_eq!(chunk.key, "feed");
        assert_eq!(chunk.result.unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_settle_all_covers_streamed() {
        let registry =
            DeferRegistry::new("/page:{}:[]", NavigationTrigger::ClientNavigation, false);
        let marker = registry.defer("lazy", None, async { Ok::<_, String>(json!("late")) });
        assert!(registry.has_streaming());

        registry.settle_all().await;
        let mut data = json!({ "lazy": marker });
        registry.apply_settled(&mut data);
        assert_eq!(data["lazy"]["$defer"]["data"], "late");
    }
}
