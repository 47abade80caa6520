//! Route registry subsystem.
//!
//! # Data Flow
//! ```text
//! RouteDecl (virtual path + hooks)
//!     → route.rs (derive variable path, freeze as StoredRoute)
//!     → registry.rs (registry insert; leaves also enter the path trie)
//!
//! Request pathname
//!     → registry.rs (trie lookup, ancestor chain assembly)
//!     → RouteMatch { chain, params, normalized pathname }
//! ```
//!
//! # Design Decisions
//! - Virtual paths are the registry keys and are globally unique
//! - Only leaf ("render") routes are URL-matchable; layouts exist to
//!   contribute ancestor context to chains
//! - Built once at startup, immutable afterwards, shared via `Arc`

pub mod registry;
pub mod route;

pub use registry::{RouteMatch, RouteTree, RouteTreeError};
pub use route::{RouteDecl, RouteKind, RoutePayload, StoredRoute};
