//! Request identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every navigation request
//! - Honor an `x-request-id` supplied by a trusted front tier
//! - Expose the ID to handlers through request extensions
//!
//! # Design Decisions
//! - Request ID added as early as possible so every log line carries it
//! - The ID is echoed back on the response by the handler, letting clients
//!   correlate a navigation with server logs

use std::fmt;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Unique identifier for a single navigation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request ID a [`RequestIdLayer`] attached.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Layer that stamps each request with an ID header and extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Service produced by [`RequestIdLayer`].
#[derive(Clone, Debug)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let id = match request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => RequestId(existing.to_string()),
            None => {
                let id = RequestId::new();
                if let Ok(value) = HeaderValue::from_str(&id.0) {
                    request.headers_mut().insert(X_REQUEST_ID, value);
                }
                id
            }
        };
        request.extensions_mut().insert(id);
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn id_seen_by_handler(request: Request<Body>) -> Option<RequestId> {
        let service = RequestIdLayer.layer(tower::service_fn(|req: Request<Body>| async move {
            Ok::<_, Infallible>(req.request_id().cloned())
        }));
        service.oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_assigns_an_id_when_missing() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(id_seen_by_handler(request).await.is_some());
    }

    #[tokio::test]
    async fn test_preserves_an_existing_id() {
        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "front-tier-1234")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            id_seen_by_handler(request).await,
            Some(RequestId("front-tier-1234".to_string()))
        );
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
