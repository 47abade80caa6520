//! Route declarations and their stored form.
//!
//! # Virtual path conventions
//! - The first segment may be a root-layout marker, written `__name`
//!   (for example `__app`). It names the root layout the route hangs off
//!   and never appears in the URL.
//! - Parenthesized segments like `(shop)` are layout groups: they qualify
//!   the virtual path (and can carry a layout of their own) but are
//!   stripped from the URL-facing variable path.
//! - Everything else is a URL segment and may use the matcher's `[param]`,
//!   `[...rest]` and `[[...rest]]` forms.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::identity::{self, ParamMap};
use crate::pipeline::hooks::{
    Authorize, AuthRequirement, DepsFn, HeadCtx, HeadFn, HeadersFn, Load, Preload, Validator,
};
use crate::render::Render;

/// What a registry entry contributes to a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Top of a chain; identified by its `__name` marker.
    Root,
    /// Ancestor context for deeper routes; never matched by URL.
    Layout,
    /// A leaf the matcher can resolve a URL to.
    Render,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Root => "root-layout",
            RouteKind::Layout => "layout",
            RouteKind::Render => "render",
        }
    }
}

/// A route's two identities: the registry key and the URL-facing pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePayload {
    /// Layout-qualified path, globally unique in the registry.
    pub virtual_path: String,
    /// Virtual path with the root marker and group segments stripped.
    pub variable_path: String,
}

/// True for a `__name` root-layout marker segment.
pub fn is_root_marker(segment: &str) -> bool {
    segment.starts_with("__")
}

/// True for a `(name)` layout-group segment.
pub fn is_group_marker(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('(') && segment.ends_with(')')
}

/// Derive the URL-facing pattern from a virtual path: drop a leading root
/// marker and every group segment. The root collapses to `/`.
pub fn variable_path_of(virtual_path: &str) -> String {
    let mut kept = Vec::new();
    for (idx, segment) in virtual_path
        .split('/')
        .filter(|s| !s.is_empty())
        .enumerate()
    {
        if idx == 0 && is_root_marker(segment) {
            continue;
        }
        if is_group_marker(segment) {
            continue;
        }
        kept.push(segment);
    }
    if kept.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", kept.join("/"))
    }
}

/// A registered route with its resolved hooks. Built once, immutable and
/// shared via `Arc` afterwards.
pub struct StoredRoute {
    pub payload: RoutePayload,
    pub kind: RouteKind,
    pub auth: AuthRequirement,
    pub authorize: Option<Arc<dyn Authorize>>,
    pub preload: Option<Arc<dyn Preload>>,
    pub loader: Option<Arc<dyn Load>>,
    pub head: Option<Arc<HeadFn>>,
    pub headers: Option<Arc<HeadersFn>>,
    pub render: Option<Arc<dyn Render>>,
    pub search: Option<Arc<dyn Validator>>,
    pub deps: Option<Arc<DepsFn>>,
    /// Page-level flag: when set, first-load deferred values stream by
    /// default instead of blocking the response.
    pub defer_disabled: bool,
}

impl StoredRoute {
    pub fn virtual_path(&self) -> &str {
        &self.payload.virtual_path
    }

    pub fn variable_path(&self) -> &str {
        &self.payload.variable_path
    }

    /// Identity string for this route at the given params and search.
    ///
    /// Only values the deps function derives from `search` enter the
    /// identity; unrelated search keys never do.
    pub fn match_id(&self, params: &ParamMap, search: &Value) -> String {
        let deps = match &self.deps {
            Some(deps_fn) => deps_fn(search),
            None => Vec::new(),
        };
        identity::compute(&self.payload.virtual_path, params, &deps)
    }

    /// Resolve the route's head hook, if declared.
    pub fn resolve_head(&self, ctx: &HeadCtx<'_>) -> Option<Value> {
        self.head.as_ref().map(|head| head(ctx))
    }

    /// Resolve the route's headers hook, if declared.
    pub fn resolve_headers(&self, ctx: &HeadCtx<'_>) -> HashMap<String, String> {
        match &self.headers {
            Some(headers) => headers(ctx),
            None => HashMap::new(),
        }
    }
}

impl std::fmt::Debug for StoredRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredRoute")
            .field("virtual_path", &self.payload.virtual_path)
            .field("variable_path", &self.payload.variable_path)
            .field("kind", &self.kind)
            .field("auth", &self.auth)
            .field("loader", &self.loader.is_some())
            .field("preload", &self.preload.is_some())
            .field("authorize", &self.authorize.is_some())
            .finish()
    }
}

/// Builder for one route registration.
pub struct RouteDecl {
    virtual_path: String,
    kind: RouteKind,
    auth: AuthRequirement,
    authorize: Option<Arc<dyn Authorize>>,
    preload: Option<Arc<dyn Preload>>,
    loader: Option<Arc<dyn Load>>,
    head: Option<Arc<HeadFn>>,
    headers: Option<Arc<HeadersFn>>,
    render: Option<Arc<dyn Render>>,
    search: Option<Arc<dyn Validator>>,
    deps: Option<Arc<DepsFn>>,
    defer_disabled: bool,
}

impl RouteDecl {
    fn new(virtual_path: impl Into<String>, kind: RouteKind) -> Self {
        Self {
            virtual_path: virtual_path.into(),
            kind,
            auth: AuthRequirement::None,
            authorize: None,
            preload: None,
            loader: None,
            head: None,
            headers: None,
            render: None,
            search: None,
            deps: None,
            defer_disabled: false,
        }
    }

    /// Declare a root layout, e.g. `RouteDecl::root("__app")`.
    pub fn root(virtual_path: impl Into<String>) -> Self {
        Self::new(virtual_path, RouteKind::Root)
    }

    /// Declare a non-root layout, e.g. `RouteDecl::layout("__app/(shop)")`.
    pub fn layout(virtual_path: impl Into<String>) -> Self {
        Self::new(virtual_path, RouteKind::Layout)
    }

    /// Declare a leaf route the matcher resolves URLs to.
    pub fn render(virtual_path: impl Into<String>) -> Self {
        Self::new(virtual_path, RouteKind::Render)
    }

    pub fn auth(mut self, requirement: AuthRequirement) -> Self {
        self.auth = requirement;
        self
    }

    pub fn authorize(mut self, hook: impl Authorize + 'static) -> Self {
        self.authorize = Some(Arc::new(hook));
        self
    }

    pub fn preload(mut self, hook: impl Preload + 'static) -> Self {
        self.preload = Some(Arc::new(hook));
        self
    }

    pub fn loader(mut self, hook: impl Load + 'static) -> Self {
        self.loader = Some(Arc::new(hook));
        self
    }

    pub fn head(
        mut self,
        hook: impl Fn(&HeadCtx<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.head = Some(Arc::new(hook));
        self
    }

    pub fn headers(
        mut self,
        hook: impl Fn(&HeadCtx<'_>) -> HashMap<String, String> + Send + Sync + 'static,
    ) -> Self {
        self.headers = Some(Arc::new(hook));
        self
    }

    pub fn renderer(mut self, render: impl Render + 'static) -> Self {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn search(mut self, validator: impl Validator + 'static) -> Self {
        self.search = Some(Arc::new(validator));
        self
    }

    pub fn deps(
        mut self,
        deps_fn: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        self.deps = Some(Arc::new(deps_fn));
        self
    }

    /// Stream first-load deferred values by default instead of awaiting
    /// them before the response.
    pub fn disable_defer(mut self) -> Self {
        self.defer_disabled = true;
        self
    }

    pub(crate) fn into_stored(self) -> StoredRoute {
        let variable_path = variable_path_of(&self.virtual_path);
        StoredRoute {
            payload: RoutePayload {
                virtual_path: self.virtual_path,
                variable_path,
            },
            kind: self.kind,
            auth: self.auth,
            authorize: self.authorize,
            preload: self.preload,
            loader: self.loader,
            head: self.head,
            headers: self.headers,
            render: self.render,
            search: self.search,
            deps: self.deps,
            defer_disabled: self.defer_disabled,
        }
    }
}
