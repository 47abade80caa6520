//! Waypoint navigation server.
//!
//! A server-side navigation router built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                NAVIGATION SERVER                  │
//!                      │                                                   │
//!   Navigation Request │  ┌─────────┐    ┌─────────┐    ┌──────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ matcher │───▶│   routes     │  │
//!                      │  │ server  │    │  (trie) │    │ (chain walk) │  │
//!                      │  └─────────┘    └─────────┘    └──────┬───────┘  │
//!                      │                                       │          │
//!                      │                                       ▼          │
//!                      │                               ┌──────────────┐   │
//!                      │                               │   pipeline   │   │
//!                      │                               │ auth → guard │   │
//!                      │                               │ → preload →  │   │
//!                      │                               │ load ∥ defer │   │
//!                      │                               └──────┬───────┘   │
//!                      │                                       │          │
//!   ndjson frames      │  ┌─────────┐    ┌──────────┐   ┌──────▼──────┐   │
//!   ◀──────────────────┼──│ stream/ │◀───│ protocol │◀──│  NavResult  │   │
//!                      │  │  sync   │    │ (frames) │   │ (per route) │   │
//!                      │  └─────────┘    └──────────┘   └─────────────┘   │
//!                      │                                                   │
//!                      │  ┌────────────────────────────────────────────┐  │
//!                      │  │           Cross-Cutting Concerns            │  │
//!                      │  │  ┌────────┐ ┌──────────────┐ ┌───────────┐ │  │
//!                      │  │  │ config │ │observability │ │ lifecycle │ │  │
//!                      │  │  └────────┘ └──────────────┘ └───────────┘ │  │
//!                      │  └────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use waypoint::config::{load_config, ConfigWatcher, ServerConfig};
use waypoint::http::NavServer;
use waypoint::lifecycle::{handle_signals, Shutdown};
use waypoint::observability::{logging, metrics};
use waypoint::pipeline::{HeadCtx, HookError, LoadCtx, LoaderPipeline};
use waypoint::routes::{RouteDecl, RouteTree, RouteTreeError};

/// Server-side navigation router.
#[derive(Parser, Debug)]
#[command(name = "waypoint", version, about)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                // Logging is not up yet; stderr is all we have.
                eprintln!("failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "waypoint starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "listening for connections"
    );

    let routes = sample_routes()?;
    let pipeline = LoaderPipeline::new(Arc::new(routes));

    let shutdown = Shutdown::new();

    // Config hot reload: file watcher and SIGHUP feed the same channel.
    let (config_updates, _watcher_guard) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(handle_signals(
                shutdown.clone(),
                Some(path.clone()),
                watcher.sender(),
            ));
            let guard = watcher.run()?;
            (updates, Some(guard))
        }
        None => {
            let (tx, updates) = tokio::sync::mpsc::unbounded_channel();
            tokio::spawn(handle_signals(shutdown.clone(), None, tx));
            (updates, None)
        }
    };

    let server = NavServer::new(config, pipeline);
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Built-in showcase routes so a bare server answers navigations.
fn sample_routes() -> Result<RouteTree, RouteTreeError> {
    let mut routes = RouteTree::new();

    routes.add_route(RouteDecl::root("__app").head(|_| json!({ "title": "Waypoint" })))?;

    routes.add_route(
        RouteDecl::render("__app/products")
            .loader(|_ctx: LoadCtx| async move {
                Ok::<_, HookError>(json!({
                    "products": [
                        { "id": "42", "name": "Compass" },
                        { "id": "7", "name": "Sextant" },
                    ]
                }))
            })
            .headers(|_ctx: &HeadCtx<'_>| {
                HashMap::from([("cache-control".to_string(), "max-age=60".to_string())])
            }),
    )?;

    routes.add_route(
        RouteDecl::render("__app/products/[id]")
            .loader(|ctx: LoadCtx| async move {
                let id = ctx.location.param("id").unwrap_or_default().to_string();
                let reviews = ctx.defer.defer("reviews", None, async move {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok::<_, String>(json!([{ "stars": 5, "text": "does the job" }]))
                });
                Ok::<_, HookError>(json!({ "id": id, "reviews": reviews }))
            })
            .head(|ctx: &HeadCtx<'_>| {
                let id = ctx.location.param("id").unwrap_or("?");
                json!({ "title": format!("Product {id}") })
            }),
    )?;

    Ok(routes)
}
