//! Frame emission for navigation responses.
//!
//! # Responsibilities
//! - Turn a pipeline result into the eager frame sequence: loader/error
//!   frames in chain order, merged head, query cache, then ready
//! - Drive streamed deferred values to chunk frames in resolution order
//! - Settle everything up front for transports that cannot stream
//!
//! # Design Decisions
//! - The emission order is part of the wire contract: clients may start
//!   rendering at `r` and must never see anything after `d`
//! - Streamed chunks go out as each computation finishes, not in
//!   registration order; a slow value never holds back a fast one
//! - Cancellation stops emission but never aborts the computations; an
//!   abandoned chunk just has nobody left to read it

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::defer::{ChunkResult, StreamedDefer};
use crate::pipeline::{NavResult, RouteResult};
use crate::protocol::frame::{encode_line, ErrorBody, Frame};
use crate::render;

/// Everything that precedes deferred chunks, in wire order.
pub fn eager_frames(result: &NavResult) -> Vec<Frame> {
    let mut frames = Vec::with_capacity(result.routes.len() + 3);

    for route in &result.routes {
        frames.push(route_frame(route));
    }

    let heads: Vec<_> = result.routes.iter().filter_map(|r| r.head.as_ref()).collect();
    if !heads.is_empty() {
        frames.push(Frame::Head {
            id: None,
            head: render::merge_head(heads),
        });
    }

    if !result.query_entries.is_empty() {
        frames.push(Frame::Query {
            entries: result.query_entries.clone(),
        });
    }

    frames.push(Frame::Ready);
    frames
}

fn route_frame(route: &RouteResult) -> Frame {
    if route.failed() {
        return Frame::Error {
            id: route.match_id.clone(),
            key: None,
            error: ErrorBody::new(route.error.clone().unwrap_or_else(|| "loader failed".into())),
        };
    }
    Frame::Loader {
        id: route.match_id.clone(),
        data: route.data.clone().unwrap_or(serde_json::Value::Null),
        ctx: (!route.context.is_empty()).then(|| route.context.to_value()),
    }
}

/// Detach every stream-mode deferred value, in chain order.
pub fn take_streaming(result: &NavResult) -> Vec<StreamedDefer> {
    result
        .routes
        .iter()
        .filter_map(|r| r.defer.as_ref())
        .flat_map(|d| d.take_streaming())
        .collect()
}

/// Settle every deferred value (streamed included) and fold the results
/// into the loader data. For responses that go out in one piece.
pub async fn settle_remaining(result: &mut NavResult) {
    for route in &mut result.routes {
        let Some(defer) = &route.defer else {
            continue;
        };
        defer.settle_all().await;
        if let Some(data) = &mut route.data {
            defer.apply_settled(data);
        }
    }
}

fn chunk_frame(chunk: ChunkResult) -> Frame {
    match chunk.result {
        Ok(data) => Frame::Chunk {
            id: chunk.match_id,
            key: chunk.key,
            data,
        },
        Err(message) => Frame::Error {
            id: chunk.match_id,
            key: Some(chunk.key),
            error: ErrorBody::new(message),
        },
    }
}

/// Drive one streaming response: eager frames, chunks as they resolve,
/// then the terminal frame. Each item sent is one encoded line.
pub async fn stream_response(
    result: NavResult,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    for frame in eager_frames(&result) {
        if tx.send(encode_line(&frame)).await.is_err() {
            return;
        }
    }

    let mut pending: FuturesUnordered<_> = take_streaming(&result)
        .into_iter()
        .map(StreamedDefer::settle)
        .collect();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(path = %result.pathname, "stream cancelled; chunks abandoned");
                return;
            }
            chunk = pending.next() => {
                let Some(chunk) = chunk else {
                    break;
                };
                crate::observability::metrics::record_deferred_chunk(chunk.result.is_err());
                if tx.send(encode_line(&chunk_frame(chunk))).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = tx.send(encode_line(&Frame::Done)).await;
}

/// The whole response as one string, for transports that cannot stream.
/// Await-mode and stream-mode values alike are settled into the data.
pub async fn sync_response(mut result: NavResult) -> String {
    settle_remaining(&mut result).await;
    let mut body = String::new();
    for frame in eager_frames(&result) {
        body.push_str(&encode_line(&frame));
    }
    body.push_str(&encode_line(&Frame::Done));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::defer::NavigationTrigger;
    use crate::pipeline::{LoadCtx, LoaderPipeline, NavRequest};
    use crate::routes::{RouteDecl, RouteTree};

    fn tags(frames: &[Frame]) -> Vec<&'static str> {
        frames
            .iter()
            .map(|f| match f {
                Frame::Loader { .. } => "l",
                Frame::Chunk { .. } => "c",
                Frame::Error { .. } => "e",
                Frame::Head { .. } => "h",
                Frame::Query { .. } => "q",
                Frame::Ready => "r",
                Frame::Done => "d",
            })
            .collect()
    }

    async fn navigate(decls: Vec<RouteDecl>, req: NavRequest) -> NavResult {
        let mut tree = RouteTree::new();
        for decl in decls {
            tree.add_route(decl).unwrap();
        }
        LoaderPipeline::new(Arc::new(tree))
            .run(req)
            .await
            .expect("navigation succeeds")
    }

    #[tokio::test]
    async fn test_eager_order_is_loaders_head_queries_ready() {
        let result = navigate(
            vec![
                RouteDecl::root("__app")
                    .loader(|_ctx: LoadCtx| async move {
                        Err::<Value, _>("shell exploded".into())
                    })
                    .head(|_| json!({ "title": "app" })),
                RouteDecl::render("__app/feed")
                    .loader(|ctx: LoadCtx| async move {
                        ctx.queries.record("feed", json!([1]));
                        Ok(json!({ "items": [1] }))
                    })
                    .head(|_| json!({ "title": "feed" })),
            ],
            NavRequest::new("/feed"),
        )
        .await;

        let frames = eager_frames(&result);
        assert_eq!(tags(&frames), vec!["e", "l", "h", "q", "r"]);

        // Chain order: the failed root first, then the leaf.
        assert!(matches!(&frames[0], Frame::Error { key: None, error, .. }
            if error.message == "shell exploded"));
        // Child head overrides the parent's.
        assert!(matches!(&frames[2], Frame::Head { id: None, head }
            if head["title"] == "feed"));
    }

    #[tokio::test]
    async fn test_routes_without_hooks_emit_minimal_frames() {
        let result = navigate(
            vec![RouteDecl::root("__app"), RouteDecl::render("__app/about")],
            NavRequest::new("/about"),
        )
        .await;

        let frames = eager_frames(&result);
        // No head, no queries: loader frames straight into ready.
        assert_eq!(tags(&frames), vec!["l", "l", "r"]);
        assert!(matches!(&frames[0], Frame::Loader { data: Value::Null, ctx: None, .. }));
    }

    #[tokio::test]
    async fn test_stream_response_orders_chunks_by_resolution() {
        let result = navigate(
            vec![RouteDecl::render("__app/dash").loader(|ctx: LoadCtx| async move {
                let slow = ctx.defer.defer("slow", Some(true), async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok::<_, String>(json!("slow"))
                });
                let fast = ctx.defer.defer("fast", Some(true), async {
                    Ok::<_, String>(json!("fast"))
                });
                let broken = ctx.defer.defer("broken", Some(true), async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err::<Value, _>("upstream 500")
                });
                Ok(json!({ "slow": slow, "fast": fast, "broken": broken }))
            })],
            NavRequest::new("/dash"),
        )
        .await;
        assert!(result.has_streaming());

        let (tx, mut rx) = mpsc::channel(16);
        stream_response(result, tx, CancellationToken::new()).await;

        let mut frames = Vec::new();
        while let Some(line) = rx.recv().await {
            frames.push(crate::protocol::frame::decode_line(&line).unwrap().unwrap());
        }

        assert_eq!(tags(&frames), vec!["l", "r", "c", "e", "c", "d"]);
        assert!(matches!(&frames[2], Frame::Chunk { key, .. } if key == "fast"));
        assert!(matches!(&frames[3], Frame::Error { key: Some(key), error, .. }
            if key == "broken" && error.message == "upstream 500"));
        assert!(matches!(&frames[4], Frame::Chunk { key, .. } if key == "slow"));
    }

    #[tokio::test]
    async fn test_sync_response_folds_streamed_values_in() {
        let result = navigate(
            vec![RouteDecl::render("__app/report").loader(|ctx: LoadCtx| async move {
                let marker = ctx.defer.defer("rows", None, async {
                    Ok::<_, String>(json!([10, 20]))
                });
                Ok(json!({ "rows": marker }))
            })],
            NavRequest::new("/report").trigger(NavigationTrigger::ClientNavigation),
        )
        .await;
        // Client navigation defaults the value to stream mode.
        assert!(result.has_streaming());

        let body = sync_response(result).await;
        let frames: Vec<Frame> = body
            .lines()
            .filter_map(|l| crate::protocol::frame::decode_line(l).unwrap())
            .collect();

        // No chunk frames: the value is already substituted into the data.
        assert_eq!(tags(&frames), vec!["l", "r", "d"]);
        assert!(matches!(&frames[0], Frame::Loader { data, .. }
            if data["rows"]["$defer"]["data"] == json!([10, 20])));
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_before_done() {
        let result = navigate(
            vec![RouteDecl::render("__app/slow").loader(|ctx: LoadCtx| async move {
                let marker = ctx.defer.defer("never", Some(true), async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, String>(json!(1))
                });
                Ok(json!({ "never": marker }))
            })],
            NavRequest::new("/slow"),
        )
        .await;

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel_clone = cancel.clone();
        let writer = tokio::spawn(stream_response(result, tx, cancel_clone));

        // Eager part arrives, then nothing until we cancel.
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.clone());
            if line.contains("\"r\"") {
                break;
            }
        }
        cancel.cancel();
        writer.await.unwrap();

        // Channel closes without a done frame.
        assert!(rx.recv().await.is_none());
        assert!(!lines.iter().any(|l| l.contains("\"d\"")));
    }

    #[tokio::test]
    async fn test_context_snapshot_rides_the_loader_frame() {
        let result = navigate(
            vec![
                RouteDecl::root("__app"),
                RouteDecl::render("__app/home")
                    .preload(|_ctx: crate::pipeline::GuardCtx| async move {
                        Ok(json!({ "org": "acme" }))
                    })
                    .loader(|_ctx: LoadCtx| async move { Ok(json!({})) }),
            ],
            NavRequest::new("/home"),
        )
        .await;

        let frames = eager_frames(&result);
        assert!(matches!(&frames[1], Frame::Loader { ctx: Some(ctx), .. }
            if ctx["org"] == "acme"));
        // The root's snapshot predates every contribution, so its frame
        // carries none.
        assert!(matches!(&frames[0], Frame::Loader { ctx: None, .. }));
    }
}
