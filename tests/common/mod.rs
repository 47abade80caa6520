//! Shared fixtures for the integration suites: a small storefront route
//! tree and helpers that boot a navigation server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use waypoint::config::ServerConfig;
use waypoint::http::NavServer;
use waypoint::lifecycle::Shutdown;
use waypoint::pipeline::{
    AuthRequest, AuthRequirement, GuardCtx, HookError, LoadCtx, LoaderPipeline, ValidationError,
};
use waypoint::routes::{RouteDecl, RouteTree};

/// Storefront route tree used by every suite.
///
/// - `/products`: catalog layout plus a listing with a search validator,
///   a query-cache entry, and a route-level response header
/// - `/products/{id}`: detail page with a deferred reviews block
/// - `/archive`: legacy layout whose loader always fails
/// - `/account`: requires authentication
/// - `/settings`: requires authentication and a `root` subject
/// - `/old-store`: loader-issued replace redirect
/// - `/live`: deferred value explicitly marked for streaming
/// - `/slow`: loader slow enough to lose a session race
pub fn demo_routes() -> RouteTree {
    let mut tree = RouteTree::new();

    tree.add_route(
        RouteDecl::root("__shop")
            .preload(|_ctx: GuardCtx| async move { Ok(json!({ "org": "acme" })) })
            .head(|_| json!({ "title": "Shop" })),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::layout("__shop/(catalog)").loader(|_ctx: LoadCtx| async move {
            Ok(json!({ "categories": ["tools", "parts"] }))
        }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/(catalog)/products")
            .search(|raw: &Value| {
                let page = match raw.get("page") {
                    None => 1,
                    Some(Value::String(s)) => s
                        .parse::<u64>()
                        .map_err(|_| ValidationError::new("page must be an integer"))?,
                    Some(_) => return Err(ValidationError::new("page must be an integer")),
                };
                Ok(json!({ "page": page }))
            })
            .loader(|ctx: LoadCtx| async move {
                ctx.queries.record("products:recent", json!(["p1", "p2"]));
                let page = ctx.location.search.get("page").cloned().unwrap_or(json!(1));
                Ok(json!({ "items": ["p1", "p2"], "page": page }))
            })
            .headers(|_| {
                [("cache-control".to_string(), "max-age=60".to_string())]
                    .into_iter()
                    .collect()
            })
            .head(|_| json!({ "title": "Products" })),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/(catalog)/products/[id]")
            .loader(|ctx: LoadCtx| async move {
                let id = ctx.location.param("id").unwrap_or("unknown").to_string();
                let reviews = ctx.defer.defer("reviews", None, async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Ok::<_, String>(json!([{ "stars": 5 }, { "stars": 3 }]))
                });
                Ok(json!({ "id": id, "name": format!("Product {id}"), "reviews": reviews }))
            })
            .head(|ctx| {
                json!({ "title": format!("Product {}", ctx.location.param("id").unwrap_or("?")) })
            }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::layout("__shop/(legacy)").loader(|_ctx: LoadCtx| async move {
            Err::<Value, _>("legacy backend down".into())
        }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/(legacy)/archive").loader(|_ctx: LoadCtx| async move {
            Ok(json!({ "entries": ["2019", "2020"] }))
        }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/account")
            .auth(AuthRequirement::Required)
            .loader(|ctx: LoadCtx| async move {
                let sub = ctx
                    .auth
                    .user()
                    .and_then(|u| u["sub"].as_str())
                    .unwrap_or("anonymous")
                    .to_string();
                Ok(json!({ "sub": sub }))
            }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/settings")
            .auth(AuthRequirement::Required)
            .authorize(|ctx: GuardCtx| async move {
                Ok(ctx.auth.user().and_then(|u| u["sub"].as_str()) == Some("root"))
            })
            .loader(|_ctx: LoadCtx| async move { Ok(json!({ "theme": "dark" })) }),
    )
    .unwrap();

    tree.add_route(RouteDecl::render("__shop/old-store").loader(
        |_ctx: LoadCtx| async move {
            Err::<Value, _>(HookError::Redirect {
                to: "/products".into(),
                status: 307,
                replace: true,
            })
        },
    ))
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/live").loader(|ctx: LoadCtx| async move {
            let ticker = ctx.defer.defer("ticker", Some(true), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, String>(json!(99))
            });
            Ok(json!({ "ticker": ticker }))
        }),
    )
    .unwrap();

    tree.add_route(
        RouteDecl::render("__shop/slow").loader(|_ctx: LoadCtx| async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(json!({ "done": true }))
        }),
    )
    .unwrap();

    tree
}

/// The storefront tree behind a pipeline with a bearer-token authenticator.
pub fn demo_pipeline() -> LoaderPipeline {
    LoaderPipeline::new(Arc::new(demo_routes())).with_authenticator(
        |req: AuthRequest| async move {
            match req.header("authorization") {
                None => Ok(None),
                Some("Bearer user-token") => Ok(Some(json!({ "sub": "u1" }))),
                Some("Bearer root-token") => Ok(Some(json!({ "sub": "root" }))),
                Some(_) => Err(HookError::Message("invalid bearer token".into())),
            }
        },
    )
}

/// Boot a navigation server on an ephemeral port, returning its address,
/// the shutdown handle, and the live config-update sender.
#[allow(dead_code)]
pub async fn spawn_server_with_updates(
    config: ServerConfig,
    pipeline: LoaderPipeline,
) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<ServerConfig>) {
    let shutdown = Shutdown::new();
    let (config_tx, config_updates) = mpsc::unbounded_channel();

    let server = NavServer::new(config, pipeline);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown, config_tx)
}

/// `spawn_server_with_updates` for suites that never push a config update.
pub async fn spawn_server(
    config: ServerConfig,
    pipeline: LoaderPipeline,
) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, updates) = spawn_server_with_updates(config, pipeline).await;
    drop(updates);
    (addr, shutdown)
}

/// An HTTP client that neither follows redirects nor picks up proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Split an ndjson body into (tag, frame) pairs.
pub fn frames(body: &str) -> Vec<(String, Value)> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("frame line parses");
            let tag = value["t"].as_str().expect("frame has a tag").to_string();
            (tag, value)
        })
        .collect()
}

/// Just the tag sequence, for wire-order assertions.
pub fn tags(frames: &[(String, Value)]) -> Vec<&str> {
    frames.iter().map(|(tag, _)| tag.as_str()).collect()
}

/// The first frame carrying the given tag.
#[allow(dead_code)]
pub fn first<'a>(frames: &'a [(String, Value)], tag: &str) -> &'a Value {
    frames
        .iter()
        .find(|(t, _)| t == tag)
        .map(|(_, frame)| frame)
        .unwrap_or_else(|| panic!("no `{tag}` frame in response"))
}
