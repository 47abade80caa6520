//! Route registry and chain assembly.
//!
//! # Responsibilities
//! - Hold every registered route keyed by virtual path
//! - Insert leaf routes into the path trie under their variable path
//! - Expand a matched leaf into its ordered ancestor chain
//!
//! # Design Decisions
//! - Immutable after construction; lookups share `Arc`s without locking
//! - Layouts and root layouts are registry-only: a URL can never resolve
//!   to one directly
//! - Duplicate virtual paths are a build-time error, not a silent
//!   overwrite

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::identity::ParamMap;
use crate::matcher::PathTrie;
use crate::routes::route::{RouteDecl, RouteKind, StoredRoute};

/// Registration-time failures.
#[derive(Debug, Error, PartialEq)]
pub enum RouteTreeError {
    #[error("virtual path {virtual_path:?} is already registered")]
    DuplicateVirtualPath { virtual_path: String },
}

/// One resolved navigation: the ancestor chain, bound parameters, and the
/// normalized pathname.
#[derive(Debug)]
pub struct RouteMatch {
    /// Root layout first, matched leaf last.
    pub chain: Vec<Arc<StoredRoute>>,
    pub params: ParamMap,
    pub pathname: String,
}

impl RouteMatch {
    pub fn leaf(&self) -> &Arc<StoredRoute> {
        self.chain.last().expect("chain ends with a leaf")
    }
}

/// The route registry plus the URL trie over its leaf routes.
#[derive(Debug, Default)]
pub struct RouteTree {
    registry: HashMap<String, Arc<StoredRoute>>,
    trie: PathTrie<Arc<StoredRoute>>,
}

impl RouteTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one route. Leaf ("render") routes also enter the matcher
    /// under their variable path; layouts only supply ancestor context.
    pub fn add_route(&mut self, decl: RouteDecl) -> Result<(), RouteTreeError> {
        let stored = Arc::new(decl.into_stored());
        let virtual_path = stored.virtual_path().to_string();

        if self.registry.contains_key(&virtual_path) {
            return Err(RouteTreeError::DuplicateVirtualPath { virtual_path });
        }

        if stored.kind == RouteKind::Render {
            let displaced = self.trie.insert(stored.variable_path(), stored.clone());
            if let Some(displaced) = displaced {
                tracing::warn!(
                    variable_path = %stored.variable_path(),
                    kept = %stored.virtual_path(),
                    displaced = %displaced.virtual_path(),
                    "two render routes share one URL pattern; the later registration wins"
                );
            }
        }

        tracing::debug!(
            virtual_path = %virtual_path,
            variable_path = %stored.variable_path(),
            kind = stored.kind.as_str(),
            "route registered"
        );
        self.registry.insert(virtual_path, stored);
        Ok(())
    }

    /// Resolve a pathname to its chain. `None` is the ordinary 404 path.
    pub fn match_path(&self, pathname: &str) -> Option<RouteMatch> {
        let hit = self.trie.find(pathname)?;
        let leaf = Arc::clone(hit.payload);

        // Walk the leaf's virtual path left to right; every strict prefix
        // that names a registered layout joins the chain.
        let segments: Vec<&str> = leaf
            .virtual_path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut chain = Vec::with_capacity(segments.len());
        for end in 1..segments.len() {
            let prefix = segments[..end].join("/");
            if let Some(ancestor) = self.registry.get(&prefix) {
                if ancestor.kind != RouteKind::Render {
                    chain.push(Arc::clone(ancestor));
                }
            }
        }
        chain.push(leaf);

        Some(RouteMatch {
            chain,
            params: hit.params.into_iter().collect(),
            pathname: hit.normalized,
        })
    }

    /// Look up a route by its virtual path.
    pub fn get(&self, virtual_path: &str) -> Option<&Arc<StoredRoute>> {
        self.registry.get(virtual_path)
    }

    /// All registered routes, in no particular order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<StoredRoute>> {
        self.registry.values()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
