//! Route hook contracts.
//!
//! # Responsibilities
//! - Define the traits a route's data hooks implement (authenticate,
//!   authorize, preload, load, search validation)
//! - Define the context values handed to each hook
//! - Give hooks one error channel that can carry either a plain failure or
//!   a navigation outcome (redirect, not-found, and friends)
//!
//! # Design Decisions
//! - Hooks take owned context structs; everything inside is `Arc`-backed,
//!   so the clones handed to concurrent loaders are cheap
//! - Blanket impls let plain `async` closures act as hooks, which keeps
//!   route declarations in tests and applications short
//! - Navigation control flow is data, not unwinding: a hook that wants to
//!   redirect returns `HookError::Redirect`, and the pipeline maps it to a
//!   tagged outcome

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::defer::{DeferRegistry, NavigationTrigger};
use crate::identity::ParamMap;
use crate::pipeline::context::{AuthState, ContextSnapshot, QueryRecorder};

/// Where the navigation landed: the normalized pathname, the parameters the
/// matcher bound, and the (validated) search object.
#[derive(Debug, Clone)]
pub struct Location {
    pub pathname: String,
    pub params: ParamMap,
    pub search: Value,
}

impl Location {
    /// Convenience accessor for a single-segment parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_single())
    }
}

/// Whether a route needs the authenticate collaborator to run, and whether
/// an anonymous result is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    /// The route ignores authentication entirely.
    #[default]
    None,
    /// Authentication runs, but an anonymous visitor may proceed.
    Optional,
    /// An anonymous visitor is rejected with an authentication error.
    Required,
}

/// Failure channel for every hook.
///
/// `Message` is an ordinary failure; the remaining variants are navigation
/// control flow that the pipeline turns into its own tagged outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HookError {
    #[error("{0}")]
    Message(String),
    #[error("redirect to {to}")]
    Redirect {
        to: String,
        status: u16,
        replace: bool,
    },
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("authentication required")]
    Unauthenticated,
}

impl HookError {
    /// An internal redirect with the default 302 status.
    pub fn redirect(to: impl Into<String>) -> Self {
        HookError::Redirect {
            to: to.into(),
            status: 302,
            replace: false,
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        HookError::Message(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        HookError::Message(message.to_string())
    }
}

/// What the authenticate collaborator sees: enough of the request to find
/// and validate credentials, without tying hooks to any HTTP framework.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub pathname: String,
    /// Header names lower-cased at extraction.
    pub headers: HashMap<String, String>,
    pub trigger: NavigationTrigger,
}

impl AuthRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Request-level authentication, invoked at most once per navigation.
///
/// `Ok(None)` means "no credentials presented"; the pipeline decides whether
/// that is acceptable from the chain's [`AuthRequirement`]s. An `Err` means
/// credentials were presented but did not validate, which is fatal even for
/// optional-auth chains.
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, req: AuthRequest) -> Result<Option<Value>, HookError>;
}

#[async_trait]
impl<F, Fut> Authenticate for F
where
    F: Fn(AuthRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, HookError>> + Send,
{
    async fn authenticate(&self, req: AuthRequest) -> Result<Option<Value>, HookError> {
        (self)(req).await
    }
}

/// Context for authorize and preload hooks: the shared auth result, the
/// preloader context accumulated by earlier routes, and the location.
#[derive(Debug, Clone)]
pub struct GuardCtx {
    pub auth: AuthState,
    pub context: ContextSnapshot,
    pub location: Arc<Location>,
}

/// Per-route access decision, run sequentially in chain order.
#[async_trait]
pub trait Authorize: Send + Sync {
    async fn authorize(&self, ctx: GuardCtx) -> Result<bool, HookError>;
}

#[async_trait]
impl<F, Fut> Authorize for F
where
    F: Fn(GuardCtx) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HookError>> + Send,
{
    async fn authorize(&self, ctx: GuardCtx) -> Result<bool, HookError> {
        (self)(ctx).await
    }
}

/// Sequential context producer, run root to leaf. The returned object merges
/// into the accumulated context for every deeper route.
#[async_trait]
pub trait Preload: Send + Sync {
    async fn preload(&self, ctx: GuardCtx) -> Result<Value, HookError>;
}

#[async_trait]
impl<F, Fut> Preload for F
where
    F: Fn(GuardCtx) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HookError>> + Send,
{
    async fn preload(&self, ctx: GuardCtx) -> Result<Value, HookError> {
        (self)(ctx).await
    }
}

/// Context for a loader: its route's own preloader snapshot plus the defer
/// and query-cache handles scoped to that route.
#[derive(Clone)]
pub struct LoadCtx {
    pub auth: AuthState,
    pub context: ContextSnapshot,
    pub location: Arc<Location>,
    pub defer: DeferRegistry,
    pub queries: QueryRecorder,
}

/// Per-route data fetcher, run concurrently across the chain.
#[async_trait]
pub trait Load: Send + Sync {
    async fn load(&self, ctx: LoadCtx) -> Result<Value, HookError>;
}

#[async_trait]
impl<F, Fut> Load for F
where
    F: Fn(LoadCtx) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HookError>> + Send,
{
    async fn load(&self, ctx: LoadCtx) -> Result<Value, HookError> {
        (self)(ctx).await
    }
}

/// Failure from a search validator.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Explicit search-object validation, one implementation per input schema.
pub trait Validator: Send + Sync {
    /// Validate the raw search object, returning the (possibly normalized)
    /// form the route's hooks should see.
    fn validate(&self, raw: &Value) -> Result<Value, ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, raw: &Value) -> Result<Value, ValidationError> {
        (self)(raw)
    }
}

/// Context for the synchronous head and headers hooks, which may read the
/// route's loader output.
#[derive(Debug)]
pub struct HeadCtx<'a> {
    pub location: &'a Location,
    pub loader_data: Option<&'a Value>,
}

/// Per-route head metadata producer.
pub type HeadFn = dyn Fn(&HeadCtx<'_>) -> Value + Send + Sync;

/// Per-route response header producer.
pub type HeadersFn = dyn Fn(&HeadCtx<'_>) -> HashMap<String, String> + Send + Sync;

/// Derives loader dependency values from the search object. Only the values
/// returned here feed the route's match identity.
pub type DepsFn = dyn Fn(&Value) -> Vec<Value> + Send + Sync;
