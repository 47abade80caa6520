//! HTTP server setup and navigation handling.
//!
//! # Responsibilities
//! - Create Axum Router with the navigation handler
//! - Wire up middleware (tracing, timeout, request ID, signature check)
//! - Translate the HTTP surface into a pipeline [`NavRequest`]
//! - Serve ndjson navigation responses, streaming deferred chunks
//! - Swap configuration in place when the watcher pushes an update
//! - Observability (metrics, correlation IDs)

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures_util::StreamExt;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::defer::NavigationTrigger;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::http::signature::{self, SIGNATURE_HEADER};
use crate::observability::metrics;
use crate::pipeline::{LoaderPipeline, NavError, NavRequest, NavResult, SessionTracker};
use crate::protocol::{stream_response, sync_response};
use crate::render;

/// Header marking a client-side navigation (data fetch, not initial load).
pub const NAVIGATE_HEADER: &str = "x-waypoint-navigate";
/// Header carrying the client session for supersede tracking.
pub const SESSION_HEADER: &str = "x-waypoint-session";
/// Header set on redirect responses when the client should replace history.
pub const REPLACE_HEADER: &str = "x-waypoint-replace";
/// Content type of navigation payloads.
pub const NDJSON: &str = "application/x-ndjson";

/// Application state injected into handlers.
///
/// Everything configuration-dependent lives behind an [`ArcSwap`] so a
/// reload swaps it atomically without restarting the listener.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<AppInner>>,
    /// Root cancellation token; each request streams under a child token.
    pub cancel: CancellationToken,
    pub started_at: Instant,
}

/// The swappable half of [`AppState`].
pub struct AppInner {
    pub config: ServerConfig,
    pub pipeline: LoaderPipeline,
    pub sessions: Arc<SessionTracker>,
}

/// HTTP server for the navigation router.
pub struct NavServer {
    router: Router,
    state: AppState,
    base_pipeline: LoaderPipeline,
}

impl NavServer {
    /// Create a new server around a pipeline and configuration.
    pub fn new(config: ServerConfig, pipeline: LoaderPipeline) -> Self {
        let state = AppState {
            inner: Arc::new(ArcSwap::from_pointee(AppInner {
                pipeline: effective_pipeline(&pipeline, &config),
                sessions: Arc::new(SessionTracker::new()),
                config: config.clone(),
            })),
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            base_pipeline: pipeline,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(navigation_handler))
            .route("/", any(navigation_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                signature_middleware,
            ))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
            .layer(GlobalConcurrencyLimitLayer::new(
                config.listener.max_connections,
            ))
    }

    /// Shared handler state, for the admin API and tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configuration updates swap the handler-visible state in place;
    /// listener-level settings (bind address, limits, timeouts) take
    /// effect on restart only.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "navigation server starting");

        // Apply config updates pushed by the watcher or SIGHUP.
        let swap_state = self.state.clone();
        let base_pipeline = self.base_pipeline.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let sessions = swap_state.inner.load().sessions.clone();
                swap_state.inner.store(Arc::new(AppInner {
                    pipeline: effective_pipeline(&base_pipeline, &new_config),
                    sessions,
                    config: new_config,
                }));
                tracing::info!("configuration updated");
            }
        });

        // Admin API on its own listener. Enabling it requires a restart.
        if self.state.inner.load().config.admin.enabled {
            tokio::spawn(crate::admin::serve_admin(self.state.clone()));
        }

        let cancel = self.state.cancel.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                // Stop deferred chunk streams so draining can finish.
                cancel.cancel();
                tracing::info!("shutdown signal received, draining");
            })
            .await?;

        tracing::info!("navigation server stopped");
        Ok(())
    }
}

fn effective_pipeline(base: &LoaderPipeline, config: &ServerConfig) -> LoaderPipeline {
    base.clone()
        .with_defer_disabled_default(config.defer.disable_by_default)
}

/// Reject requests whose signature is missing, stale, or wrong.
async fn signature_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let inner = state.inner.load_full();
    if !inner.config.signature.enabled {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let header = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let verdict = match header {
        Some(header) => signature::verify(
            &target,
            header,
            &inner.config.signature.secret,
            inner.config.signature.window_secs,
            signature::unix_now(),
        ),
        None => Err(signature::SignatureError::Malformed),
    };

    if let Err(e) = verdict {
        tracing::warn!(path = %request.uri().path(), error = %e, "request signature rejected");
        metrics::record_navigation(403, Duration::ZERO);
        return (StatusCode::FORBIDDEN, "request signature rejected").into_response();
    }

    next.run(request).await
}

/// Main navigation handler.
/// Runs the loader pipeline and emits the ndjson navigation payload.
async fn navigation_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let inner = state.inner.load_full();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        path = %path,
        "navigation request"
    );

    let mut nav = NavRequest::new(&path).search(parse_search(request.uri().query()));
    if request.headers().contains_key(NAVIGATE_HEADER) {
        nav = nav.trigger(NavigationTrigger::ClientNavigation);
    }
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            nav = nav.header(name.as_str(), value);
        }
    }

    let session = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ticket = inner.sessions.begin(session.as_deref());

    let outcome = inner.pipeline.run(nav).await;

    // A newer navigation in the same session superseded this one while
    // its loaders ran; the payload would only be thrown away client-side.
    if !inner.sessions.is_current(&ticket) {
        tracing::debug!(request_id = %request_id, path = %path, "navigation superseded");
        metrics::record_superseded();
        metrics::record_navigation(204, start_time.elapsed());
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut response = match outcome {
        Ok(result) => data_response(&state, &inner, result).await,
        Err(err) => error_response(err, &request_id),
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    metrics::record_navigation(response.status().as_u16(), start_time.elapsed());
    response
}

/// Parse the query string into the raw search object handed to validators.
/// Repeated keys collect into an array; single keys stay strings.
fn parse_search(query: Option<&str>) -> Value {
    let mut search = Map::new();
    let Some(query) = query else {
        return Value::Object(search);
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match search.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    Value::Object(search)
}

/// Build the 200 ndjson response, streaming when deferred work remains.
async fn data_response(state: &AppState, inner: &AppInner, result: NavResult) -> Response {
    // Route-level response headers merge root → leaf, leaf wins.
    let merged = render::merge_headers(result.routes.iter().map(|r| &r.headers));
    let streaming = inner.config.defer.streaming && result.has_streaming();

    let mut response = if streaming {
        let (tx, rx) = mpsc::channel::<String>(32);
        tokio::spawn(stream_response(result, tx, state.cancel.child_token()));
        Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>)).into_response()
    } else {
        sync_response(result).await.into_response()
    };

    let headers = response.headers_mut();
    for (name, value) in &merged {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    response
}

/// Map a pipeline error to its HTTP status.
fn error_response(err: NavError, request_id: &str) -> Response {
    match err {
        NavError::NotFound => (StatusCode::NOT_FOUND, "no route matched").into_response(),
        NavError::Unauthenticated => {
            (StatusCode::UNAUTHORIZED, "authentication required").into_response()
        }
        NavError::Forbidden { route } => {
            tracing::debug!(request_id = %request_id, route = %route, "navigation denied");
            (StatusCode::FORBIDDEN, "access denied").into_response()
        }
        NavError::ValidationFailed { message } => (
            StatusCode::BAD_REQUEST,
            format!("search validation failed: {message}"),
        )
            .into_response(),
        NavError::Redirect {
            to,
            status,
            replace,
        } => redirect_response(&to, status, replace),
    }
}

fn redirect_response(to: &str, status: u16, replace: bool) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
    let mut builder = Response::builder()
        .status(status)
        .header(header::LOCATION, to);
    if replace {
        builder = builder.header(REPLACE_HEADER, "1");
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
