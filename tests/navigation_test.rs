//! End-to-end navigation tests: chain assembly over HTTP, loader failure
//! isolation, guards, search validation, and loader-issued redirects.

mod common;

use serde_json::json;
use waypoint::config::ServerConfig;

#[tokio::test]
async fn test_navigation_emits_chain_in_wire_order() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/products"))
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/x-ndjson"),
        "navigation responses are ndjson"
    );

    let body = response.text().await.unwrap();
    let frames = common::frames(&body);
    assert_eq!(
        common::tags(&frames),
        vec!["l", "l", "l", "h", "q", "r", "d"],
        "root to leaf, then head, query cache, ready, done"
    );

    // The root has no loader: null data, but it still carries the
    // preloader context it contributed.
    let (_, root) = &frames[0];
    assert!(root["id"].as_str().unwrap().starts_with("__shop:"));
    assert!(root["data"].is_null());
    assert_eq!(root["ctx"]["org"], "acme");

    let (_, leaf) = &frames[2];
    assert_eq!(leaf["data"]["items"], json!(["p1", "p2"]));

    // Leaf head wins the merge; the query frame carries the recorded entry.
    let head = common::first(&frames, "h");
    assert_eq!(head["head"]["title"], "Products");
    let query = common::first(&frames, "q");
    assert_eq!(query["entries"][0]["key"], "products:recent");

    shutdown.trigger();
}

#[tokio::test]
async fn test_loader_failure_stays_on_its_route() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/archive"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "an isolated failure is not fatal");

    let body = response.text().await.unwrap();
    let frames = common::frames(&body);
    assert_eq!(common::tags(&frames), vec!["l", "e", "l", "h", "r", "d"]);

    // The failed layout reports in place; no key means the whole route.
    let (_, error) = &frames[1];
    assert_eq!(error["error"]["message"], "legacy backend down");
    assert!(error.get("key").is_none());

    // Its child still loaded.
    let (_, leaf) = &frames[2];
    assert_eq!(leaf["data"]["entries"], json!(["2019", "2020"]));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/no/such/page"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn test_literal_segments_match_case_insensitively() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/PRODUCTS/Widget-9"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Literals fold, parameter values keep their case.
    let body = response.text().await.unwrap();
    let frames = common::frames(&body);
    let (_, leaf) = &frames[2];
    assert_eq!(leaf["data"]["id"], "Widget-9");

    shutdown.trigger();
}

#[tokio::test]
async fn test_loader_redirect_carries_location_and_replace() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/old-store"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok()),
        Some("/products")
    );
    assert_eq!(
        response
            .headers()
            .get("x-waypoint-replace")
            .and_then(|v| v.to_str().ok()),
        Some("1"),
        "replace-mode redirects are flagged for the client router"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_required_auth_gates_the_chain() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let anonymous = client
        .get(format!("http://{addr}/account"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401, "no credentials on a required chain");

    let bad = client
        .get(format!("http://{addr}/account"))
        .header("authorization", "Bearer forged")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 401, "rejected credentials are a hard stop");

    let good = client
        .get(format!("http://{addr}/account"))
        .header("authorization", "Bearer user-token")
        .send()
        .await
        .unwrap();
    assert_eq!(good.status(), 200);

    let frames = common::frames(&good.text().await.unwrap());
    let (_, leaf) = &frames[1];
    assert_eq!(leaf["data"]["sub"], "u1", "loaders see the authenticated subject");

    shutdown.trigger();
}

#[tokio::test]
async fn test_authorize_denies_non_root_subjects() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let denied = client
        .get(format!("http://{addr}/settings"))
        .header("authorization", "Bearer user-token")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);

    let allowed = client
        .get(format!("http://{addr}/settings"))
        .header("authorization", "Bearer root-token")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    shutdown.trigger();
}

#[tokio::test]
async fn test_search_validation_rejects_bad_input() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let rejected = client
        .get(format!("http://{addr}/products?page=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);
    let body = rejected.text().await.unwrap();
    assert!(
        body.contains("page must be an integer"),
        "validator message reaches the client, got: {body}"
    );

    // Valid input reaches the loader in its normalized form.
    let accepted = client
        .get(format!("http://{addr}/products?page=3"))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 200);
    let frames = common::frames(&accepted.text().await.unwrap());
    let (_, leaf) = &frames[2];
    assert_eq!(leaf["data"]["page"], 3, "string input became a number");

    shutdown.trigger();
}

#[tokio::test]
async fn test_route_headers_reach_the_response() {
    let (addr, shutdown) =
        common::spawn_server(ServerConfig::default(), common::demo_pipeline()).await;
    let client = common::client();

    let response = client
        .get(format!("http://{addr}/products"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=60")
    );

    shutdown.trigger();
}
