pub mod auth;
pub mod handlers;

use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};

use crate::http::server::AppState;

use self::auth::admin_auth_middleware;
use self::handlers::*;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/sessions", get(get_sessions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

/// Bind and serve the admin API until the root token cancels.
pub async fn serve_admin(state: AppState) {
    let address = state.inner.load().config.admin.bind_address.clone();
    let addr: SocketAddr = match address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(address = %address, error = %e, "invalid admin bind address");
            return;
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "failed to bind admin listener");
            return;
        }
    };
    tracing::info!(address = %addr, "admin API listening");

    let cancel = state.cancel.clone();
    let router = setup_admin_router(state);
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "admin server error");
    }
}
