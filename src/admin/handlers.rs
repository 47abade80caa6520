use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::pipeline::AuthRequirement;
use crate::routes::RouteKind;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub active_sessions: usize,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub virtual_path: String,
    pub variable_path: String,
    pub kind: &'static str,
    pub auth: &'static str,
    pub has_loader: bool,
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub session: String,
    pub seq: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.inner.load_full();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: inner.pipeline.routes().len(),
        active_sessions: inner.sessions.active_sessions(),
    })
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteSummary>> {
    let inner = state.inner.load_full();
    let mut summaries: Vec<RouteSummary> = inner
        .pipeline
        .routes()
        .routes()
        .map(|route| RouteSummary {
            virtual_path: route.payload.virtual_path.clone(),
            variable_path: route.payload.variable_path.clone(),
            kind: match route.kind {
                RouteKind::Root => "root",
                RouteKind::Layout => "layout",
                RouteKind::Render => "render",
            },
            auth: match route.auth {
                AuthRequirement::None => "none",
                AuthRequirement::Optional => "optional",
                AuthRequirement::Required => "required",
            },
            has_loader: route.loader.is_some(),
        })
        .collect();
    summaries.sort_by(|a, b| a.virtual_path.cmp(&b.virtual_path));
    Json(summaries)
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let inner = state.inner.load();
    let mut sessions: Vec<SessionSummary> = inner
        .sessions
        .snapshot()
        .into_iter()
        .map(|(session, seq)| SessionSummary { session, seq })
        .collect();
    sessions.sort_by(|a, b| a.session.cmp(&b.session));
    Json(sessions)
}
