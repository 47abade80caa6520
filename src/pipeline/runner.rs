//! The navigation pipeline.
//!
//! # Responsibilities
//! - Resolve a pathname to its route chain and drive every hook stage:
//!   validate search, authenticate, authorize, preload, load
//! - Accumulate preloader context sequentially and hand each loader the
//!   snapshot from its own route's turn
//! - Start every loader before awaiting any, and keep one route's failure
//!   from touching its siblings
//!
//! # Data Flow
//! ```text
//! NavRequest -> match -> validate -> authenticate -> per route in chain
//! order { authorize -> preload -> snapshot } -> spawn loaders -> join ->
//! NavResult (per-route data/error + defer registries)
//! ```
//!
//! # Design Decisions
//! - Authorize and preload interleave per route: a route's guard sees the
//!   context its ancestors preloaded, and its own preloader output joins
//!   the context before any descendant runs
//! - Hook control flow (redirect, not-found, forbidden, unauthenticated)
//!   is fatal wherever it surfaces; plain failure messages are fatal only
//!   from guards, and isolated to their route everywhere else
//! - Loaders run as spawned tasks so they make progress concurrently even
//!   while earlier chain entries are still being awaited

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::defer::{DeferRegistry, NavigationTrigger};
use crate::pipeline::context::{AuthState, ContextAccumulator, ContextSnapshot, QueryRecorder};
use crate::pipeline::hooks::{
    AuthRequest, AuthRequirement, Authenticate, GuardCtx, HeadCtx, HookError, LoadCtx, Location,
};
use crate::pipeline::outcome::{NavError, NavResult, RouteResult, RouteStatus};
use crate::routes::{RouteTree, StoredRoute};

/// One navigation to resolve, independent of the transport it arrived on.
#[derive(Debug, Clone)]
pub struct NavRequest {
    pub pathname: String,
    /// Raw search object as parsed from the query string.
    pub search: Value,
    /// Request headers, names lower-cased.
    pub headers: HashMap<String, String>,
    pub trigger: NavigationTrigger,
}

impl NavRequest {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: Value::Object(Default::default()),
            headers: HashMap::new(),
            trigger: NavigationTrigger::InitialLoad,
        }
    }

    pub fn search(mut self, search: Value) -> Self {
        self.search = search;
        self
    }

    pub fn trigger(mut self, trigger: NavigationTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}

/// How one hook failure affects the navigation.
enum HookFailure {
    /// Abort the whole navigation with this outcome.
    Fatal(NavError),
    /// Mark the route failed and keep going.
    Isolated(String),
}

fn classify(err: HookError, route: &str) -> HookFailure {
    match err {
        HookError::Message(message) => HookFailure::Isolated(message),
        HookError::Redirect { to, status, replace } => {
            HookFailure::Fatal(NavError::Redirect { to, status, replace })
        }
        HookError::NotFound => HookFailure::Fatal(NavError::NotFound),
        HookError::Forbidden => HookFailure::Fatal(NavError::Forbidden {
            route: route.to_string(),
        }),
        HookError::Unauthenticated => HookFailure::Fatal(NavError::Unauthenticated),
    }
}

/// Drives navigations against an immutable route tree.
///
/// Cheap to clone; server state holds one per process and hands clones to
/// request handlers.
#[derive(Clone)]
pub struct LoaderPipeline {
    routes: Arc<RouteTree>,
    authenticate: Option<Arc<dyn Authenticate>>,
    defer_disabled_default: bool,
}

impl LoaderPipeline {
    pub fn new(routes: Arc<RouteTree>) -> Self {
        Self {
            routes,
            authenticate: None,
            defer_disabled_default: false,
        }
    }

    /// Install the request-level authenticate collaborator.
    pub fn with_authenticator(mut self, hook: impl Authenticate + 'static) -> Self {
        self.authenticate = Some(Arc::new(hook));
        self
    }

    /// Treat every page as disable-defer, regardless of its own flag.
    /// Driven by the `defer.disable_by_default` config switch.
    pub fn with_defer_disabled_default(mut self, disabled: bool) -> Self {
        self.defer_disabled_default = disabled;
        self
    }

    pub fn routes(&self) -> &Arc<RouteTree> {
        &self.routes
    }

    /// Run one navigation end to end.
    pub async fn run(&self, req: NavRequest) -> Result<NavResult, NavError> {
        let started = Instant::now();

        let matched = match self.routes.match_path(&req.pathname) {
            Some(matched) => matched,
            None => {
                crate::observability::metrics::record_match(false);
                tracing::debug!(path = %req.pathname, "no route matched");
                return Err(NavError::NotFound);
            }
        };
        crate::observability::metrics::record_match(true);

        let chain = &matched.chain;
        let leaf_path = matched.leaf().virtual_path().to_string();

        // Stage 0: search validation. Every declared validator sees the raw
        // search; their normalized outputs merge over it in chain order.
        let search = self.validate_search(chain, &req.search)?;

        // Stage 1: authenticate, at most once per request.
        let auth = self.authenticate(chain, &matched.pathname, &req, &leaf_path).await?;

        let location = Arc::new(Location {
            pathname: matched.pathname.clone(),
            params: matched.params.clone(),
            search: search.clone(),
        });

        // Stages 2+3: authorize and preload, interleaved per route so each
        // guard sees exactly what its ancestors preloaded.
        let mut accumulator = ContextAccumulator::new();
        let mut snapshots: Vec<ContextSnapshot> = Vec::with_capacity(chain.len());
        let mut preload_failures: Vec<Option<String>> = vec![None; chain.len()];

        for (idx, route) in chain.iter().enumerate() {
            let inherited = accumulator.snapshot();

            if let Some(authorize) = &route.authorize {
                let ctx = GuardCtx {
                    auth: auth.clone(),
                    context: inherited.clone(),
                    location: Arc::clone(&location),
                };
                match authorize.authorize(ctx).await {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(NavError::Forbidden {
                            route: route.virtual_path().to_string(),
                        });
                    }
                    Err(err) => match classify(err, route.virtual_path()) {
                        HookFailure::Fatal(err) => return Err(err),
                        // A guard that cannot decide must not let the
                        // navigation through.
                        HookFailure::Isolated(message) => {
                            tracing::warn!(
                                route = %route.virtual_path(),
                                error = %message,
                                "authorize hook failed; denying"
                            );
                            return Err(NavError::Forbidden {
                                route: route.virtual_path().to_string(),
                            });
                        }
                    },
                }
            }

            if let Some(preload) = &route.preload {
                let ctx = GuardCtx {
                    auth: auth.clone(),
                    context: inherited,
                    location: Arc::clone(&location),
                };
                match preload.preload(ctx).await {
                    Ok(contribution) => accumulator.merge(contribution),
                    Err(err) => match classify(err, route.virtual_path()) {
                        HookFailure::Fatal(err) => return Err(err),
                        HookFailure::Isolated(message) => {
                            tracing::warn!(
                                route = %route.virtual_path(),
                                error = %message,
                                "preloader failed; route isolated"
                            );
                            preload_failures[idx] = Some(message);
                        }
                    },
                }
            }

            snapshots.push(accumulator.snapshot());
        }

        // Stage 4: loaders, all spawned before any is awaited. The leaf's
        // disable-defer flag sets the first-load default for the whole
        // chain.
        let defer_disabled = matched.leaf().defer_disabled || self.defer_disabled_default;
        let queries = QueryRecorder::default();
        let match_ids: Vec<String> = chain
            .iter()
            .map(|route| route.match_id(&matched.params, &search))
            .collect();

        let mut spawned: Vec<Option<(DeferRegistry, LoaderTask)>> = Vec::with_capacity(chain.len());
        for (idx, route) in chain.iter().enumerate() {
            let loader = match &route.loader {
                Some(loader) if preload_failures[idx].is_none() => Arc::clone(loader),
                _ => {
                    spawned.push(None);
                    continue;
                }
            };
            let defer = DeferRegistry::new(match_ids[idx].clone(), req.trigger, defer_disabled);
            let ctx = LoadCtx {
                auth: auth.clone(),
                context: snapshots[idx].clone(),
                location: Arc::clone(&location),
                defer: defer.clone(),
                queries: queries.clone(),
            };
            let registry = defer.clone();
            let handle = tokio::spawn(async move {
                let mut data = loader.load(ctx).await?;
                // Await-mode deferred values block here, inside the task,
                // so sibling loaders keep running meanwhile.
                registry.settle_awaited().await;
                registry.apply_settled(&mut data);
                Ok(data)
            });
            spawned.push(Some((defer, handle)));
        }

        let settled = {
            let (slots, handles): (Vec<_>, Vec<_>) = spawned
                .into_iter()
                .enumerate()
                .filter_map(|(idx, slot)| slot.map(|(defer, handle)| ((idx, defer), handle)))
                .unzip();
            let results = join_all(handles).await;
            slots.into_iter().zip(results).collect::<Vec<_>>()
        };

        let mut loaded: Vec<Option<(DeferRegistry, Result<Value, HookError>)>> =
            (0..chain.len()).map(|_| None).collect();
        for ((idx, defer), joined) in settled {
            let result = match joined {
                Ok(result) => result,
                Err(err) => Err(HookError::Message(format!("loader task failed: {err}"))),
            };
            loaded[idx] = Some((defer, result));
        }

        // Assemble per-route results in chain order. The first fatal hook
        // outcome wins; plain failures stay on their route.
        let mut routes = Vec::with_capacity(chain.len());
        for (idx, route) in chain.iter().enumerate() {
            let entry = assemble_route(
                route,
                &location,
                match_ids[idx].clone(),
                snapshots[idx].clone(),
                preload_failures[idx].take(),
                loaded[idx].take(),
            )?;
            routes.push(entry);
        }

        tracing::debug!(
            path = %matched.pathname,
            routes = routes.len(),
            failed = routes.iter().filter(|r| r.failed()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "navigation pipeline finished"
        );
        crate::observability::metrics::record_pipeline_duration(started.elapsed());

        Ok(NavResult {
            pathname: matched.pathname,
            auth,
            context: accumulator.snapshot(),
            routes,
            query_entries: queries.drain(),
        })
    }

    fn validate_search(
        &self,
        chain: &[Arc<StoredRoute>],
        raw: &Value,
    ) -> Result<Value, NavError> {
        let mut effective = raw.clone();
        for route in chain {
            let Some(validator) = &route.search else {
                continue;
            };
            let validated = validator.validate(raw).map_err(|err| {
                tracing::debug!(
                    route = %route.virtual_path(),
                    error = %err.message,
                    "search validation failed"
                );
                NavError::ValidationFailed {
                    message: err.message,
                }
            })?;
            merge_search(&mut effective, validated);
        }
        Ok(effective)
    }

    async fn authenticate(
        &self,
        chain: &[Arc<StoredRoute>],
        pathname: &str,
        req: &NavRequest,
        leaf_path: &str,
    ) -> Result<AuthState, NavError> {
        let wanted = chain.iter().any(|r| r.auth != AuthRequirement::None);
        let required = chain.iter().any(|r| r.auth == AuthRequirement::Required);
        if !wanted {
            return Ok(AuthState::anonymous());
        }

        let Some(hook) = &self.authenticate else {
            if required {
                tracing::warn!(
                    path = %pathname,
                    "chain requires authentication but no authenticator is installed"
                );
                return Err(NavError::Unauthenticated);
            }
            return Ok(AuthState::anonymous());
        };

        let auth_req = AuthRequest {
            pathname: pathname.to_string(),
            headers: req.headers.clone(),
            trigger: req.trigger,
        };
        match hook.authenticate(auth_req).await {
            Ok(Some(user)) => Ok(AuthState::authenticated(user)),
            Ok(None) if required => Err(NavError::Unauthenticated),
            Ok(None) => Ok(AuthState::anonymous()),
            Err(err) => match classify(err, leaf_path) {
                HookFailure::Fatal(err) => Err(err),
                // Presented credentials that fail to validate are a hard
                // stop even when every route's auth is optional.
                HookFailure::Isolated(message) => {
                    tracing::debug!(path = %pathname, error = %message, "authentication failed");
                    Err(NavError::Unauthenticated)
                }
            },
        }
    }

}

type LoaderTask = JoinHandle<Result<Value, HookError>>;

fn assemble_route(
    route: &Arc<StoredRoute>,
    location: &Arc<Location>,
    match_id: String,
    context: ContextSnapshot,
    preload_failure: Option<String>,
    loaded: Option<(DeferRegistry, Result<Value, HookError>)>,
) -> Result<RouteResult, NavError> {
    let (defer, status, data, error) = match (preload_failure, loaded) {
        (Some(message), _) => (None, RouteStatus::Error, None, Some(message)),
        (None, Some((defer, Ok(data)))) => (Some(defer), RouteStatus::Success, Some(data), None),
        (None, Some((defer, Err(err)))) => match classify(err, route.virtual_path()) {
            HookFailure::Fatal(err) => return Err(err),
            HookFailure::Isolated(message) => {
                tracing::warn!(
                    route = %route.virtual_path(),
                    error = %message,
                    "loader failed; route isolated"
                );
                crate::observability::metrics::record_loader_failure(route.virtual_path());
                (Some(defer), RouteStatus::Error, None, Some(message))
            }
        },
        (None, None) => (None, RouteStatus::Success, None, None),
    };

    let head_ctx = HeadCtx {
        location: location.as_ref(),
        loader_data: data.as_ref(),
    };
    let head = route.resolve_head(&head_ctx);
    let headers = route.resolve_headers(&head_ctx);

    Ok(RouteResult {
        virtual_path: route.virtual_path().to_string(),
        match_id,
        status,
        data,
        error,
        context,
        head,
        headers,
        defer,
    })
}

/// Merge one validator's normalized output over the effective search.
/// Object keys override individually; a non-object output replaces the
/// whole value.
fn merge_search(effective: &mut Value, validated: Value) {
    match (effective, validated) {
        (Value::Object(target), Value::Object(entries)) => {
            for (key, value) in entries {
                target.insert(key, value);
            }
        }
        (target, validated) => *target = validated,
    }
}
