//! Pipeline outcome types.
//!
//! # Design Decisions
//! - Navigation control flow is a tagged result, not an exception: the
//!   fatal cases are `NavError` variants and ordinary success is
//!   `NavResult`, so every caller propagates with `?` or matches
//! - A loader failure is not in `NavError` at all; it is per-route state
//!   inside `RouteResult`, because one route's failure must never take its
//!   siblings down

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::defer::DeferRegistry;
use crate::pipeline::context::{AuthState, ContextSnapshot, QueryEntry};

/// The pipeline-fatal navigation outcomes.
///
/// Each maps to one HTTP status at the serving layer; none of them carry
/// partial route results.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavError {
    /// No route matched the pathname. The ordinary 404 condition.
    #[error("no route matched")]
    NotFound,

    /// A hook asked for the navigation to land somewhere else.
    #[error("redirect to {to}")]
    Redirect {
        to: String,
        status: u16,
        replace: bool,
    },

    /// Required authentication is missing or did not validate.
    #[error("authentication required")]
    Unauthenticated,

    /// An authorize hook denied the chain.
    #[error("access denied at {route}")]
    Forbidden { route: String },

    /// A search validator rejected the request's search object.
    #[error("search validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Everything the pipeline produced for one successful navigation.
pub struct NavResult {
    /// Normalized pathname (literal segments case-folded).
    pub pathname: String,
    /// The shared authenticate result.
    pub auth: AuthState,
    /// The final accumulated preloader context.
    pub context: ContextSnapshot,
    /// Per-route results in chain order, root layout first.
    pub routes: Vec<RouteResult>,
    /// Dehydrated query-cache entries recorded by loaders.
    pub query_entries: Vec<QueryEntry>,
}

impl NavResult {
    /// True if any route registered a stream-mode deferred value.
    pub fn has_streaming(&self) -> bool {
        self.routes
            .iter()
            .filter_map(|r| r.defer.as_ref())
            .any(DeferRegistry::has_streaming)
    }

    /// The leaf entry. The chain invariant guarantees one exists.
    pub fn leaf(&self) -> &RouteResult {
        self.routes.last().expect("chain ends with a leaf")
    }
}

/// How one route's data stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Success,
    Error,
}

/// One chain entry's result.
pub struct RouteResult {
    pub virtual_path: String,
    /// Identity string for this route at these params/deps.
    pub match_id: String,
    pub status: RouteStatus,
    /// Loader output with awaited defer markers already substituted.
    /// `None` when the route has no loader.
    pub data: Option<Value>,
    /// The isolated failure message, when `status` is `Error`.
    pub error: Option<String>,
    /// The preloader context as this route's loader saw it.
    pub context: ContextSnapshot,
    /// Resolved head metadata from the route's head hook.
    pub head: Option<Value>,
    /// Response headers contributed by the route's headers hook.
    pub headers: HashMap<String, String>,
    /// Defer registry, present when the route declared a loader.
    pub defer: Option<DeferRegistry>,
}

impl RouteResult {
    pub fn failed(&self) -> bool {
        self.status == RouteStatus::Error
    }
}
