//! Waypoint: a server-side navigation router.
//!
//! Routes are declared by layout-qualified virtual paths, matched by a
//! radix trie, and resolved through a staged loader pipeline (validate →
//! authenticate → authorize/preload → parallel load). Results are served
//! over HTTP as newline-delimited JSON frames, with deferred values
//! streamed after the eager payload.

pub mod admin;
pub mod config;
pub mod defer;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod matcher;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod render;
pub mod routes;

pub use config::{load_config, ServerConfig};
pub use http::NavServer;
pub use lifecycle::Shutdown;
pub use pipeline::{LoaderPipeline, NavRequest};
pub use routes::{RouteDecl, RouteTree};
