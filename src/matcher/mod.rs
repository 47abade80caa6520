//! Path matching subsystem.
//!
//! # Data Flow
//! ```text
//! route pattern ("/products/[id]")
//!     → segment.rs (classify each `/`-delimited piece)
//!     → tree.rs (insert into radix tree)
//!
//! request pathname ("/Products/123")
//!     → tree.rs (priority-ordered descent with backtracking)
//!     → TrieMatch { payload, params, normalized pathname }
//! ```
//!
//! # Design Decisions
//! - Literal segments are case-folded at insert and lookup; parameter
//!   values keep the caller's casing
//! - Branch priority at every node: literal > dynamic > catch-all >
//!   optional catch-all
//! - A failed branch backtracks instead of failing the whole lookup
//! - No-match is `None`, not an error (it is the ordinary 404 path)

pub mod segment;
pub mod tree;

pub use segment::Segment;
pub use tree::{ParamValue, PathTrie, TrieMatch};
