//! Rust client for waypoint navigation servers.

pub mod client;

pub use client::{
    parse_lines, sign, Chunk, ClientError, NavClient, NavResponse, NavigationPayload, RouteData,
};
