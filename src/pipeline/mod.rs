//! Navigation pipeline subsystem.
//!
//! Resolves one navigation request end to end: route matching, search
//! validation, authentication, per-route guards and preloaders, then the
//! concurrent loader stage. Submodules:
//!
//! - `hooks`: the traits application code implements per route
//! - `context`: auth state, accumulated preloader context, query cache
//! - `runner`: the pipeline state machine itself
//! - `outcome`: the tagged success/failure results
//! - `session`: last-writer-wins sequencing per client session

pub mod context;
pub mod hooks;
pub mod outcome;
pub mod runner;
pub mod session;

pub use context::{AuthState, ContextSnapshot, QueryEntry, QueryRecorder};
pub use hooks::{
    AuthRequest, AuthRequirement, Authenticate, Authorize, GuardCtx, HeadCtx, HookError, Load,
    LoadCtx, Location, Preload, ValidationError, Validator,
};
pub use outcome::{NavError, NavResult, RouteResult, RouteStatus};
pub use runner::{LoaderPipeline, NavRequest};
pub use session::{NavTicket, SessionTracker};
