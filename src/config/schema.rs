//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! navigation server. All types derive Serde traits for deserialization
//! from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the navigation server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Request signature verification.
    pub signature: SignatureConfig,

    /// Deferred-value policy.
    pub defer: DeferConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Request signature verification settings.
///
/// When enabled, navigation requests must carry an HMAC signature header
/// computed over the pathname and query with the shared secret.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Require signed navigation requests.
    pub enabled: bool,

    /// Shared HMAC secret. Must be non-empty when enabled.
    pub secret: String,

    /// Accepted clock skew between signing and verification, in seconds.
    pub window_secs: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            window_secs: 60,
        }
    }
}

/// Deferred-value policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeferConfig {
    /// Allow streaming responses at all. When off, every deferred value is
    /// settled before the response body goes out.
    pub streaming: bool,

    /// Treat every page as if it declared disable-defer: first-load
    /// deferred values stream by default instead of blocking.
    pub disable_by_default: bool,
}

impl Default for DeferConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            disable_by_default: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time allowed for producing the eager response, in seconds.
    /// Streamed chunks are not covered; they arrive after the response
    /// has started.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
