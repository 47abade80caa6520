//! Minimal embedding: declare routes, run the pipeline, and print the
//! wire payloads for a first load and a client-side navigation.
//!
//! Run with `cargo run --example quickstart`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use waypoint::defer::NavigationTrigger;
use waypoint::pipeline::LoadCtx;
use waypoint::protocol::sync_response;
use waypoint::{LoaderPipeline, NavRequest, RouteDecl, RouteTree};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut tree = RouteTree::new();

    tree.add_route(RouteDecl::root("__docs").head(|_| json!({ "title": "Docs" })))?;

    tree.add_route(
        RouteDecl::render("__docs/guides/[slug]")
            .loader(|ctx: LoadCtx| async move {
                let slug = ctx.location.param("slug").unwrap_or("index").to_string();
                let related = ctx.defer.defer("related", None, async {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    Ok::<_, String>(json!(["getting-started", "deployment"]))
                });
                Ok(json!({ "slug": slug, "body": format!("# {slug}"), "related": related }))
            })
            .head(|ctx| json!({ "title": ctx.location.param("slug").unwrap_or("guide") })),
    )?;

    let pipeline = LoaderPipeline::new(Arc::new(tree));

    // A first load blocks on the deferred value; it arrives settled.
    let result = pipeline.run(NavRequest::new("/guides/routing")).await?;
    println!("--- first load ---");
    print!("{}", sync_response(result).await);

    // A client navigation marks the same value for streaming. This
    // transport cannot stream, so it is folded back in; over HTTP it
    // would arrive as a separate `c` line after `r`.
    let result = pipeline
        .run(NavRequest::new("/guides/routing").trigger(NavigationTrigger::ClientNavigation))
        .await?;
    println!("--- client navigation ---");
    print!("{}", sync_response(result).await);

    Ok(())
}
