//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, signature check)
//!     → request.rs (add request ID)
//!     → pipeline (match, hooks, loaders)
//!     → protocol (ndjson frames, eager or streamed)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod signature;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::{
    AppInner, AppState, NavServer, NAVIGATE_HEADER, NDJSON, REPLACE_HEADER, SESSION_HEADER,
};
pub use signature::{sign, verify, SignatureError, SIGNATURE_HEADER};
