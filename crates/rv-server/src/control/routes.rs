//! Control-plane routes
//!
//! - `GET /connections` lists live tunnels
//! - `POST /close` closes one tunnel by id
//! - `POST /shutdown` answers, then drains the daemon after a grace delay

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use rv_core::control::{
    CloseRequest, ConnectionInfo, ErrorBody, StatusBody, CLOSE_PATH, CONNECTIONS_PATH,
    SHUTDOWN_PATH,
};
use rv_core::TunnelId;

use crate::state::ServerState;

/// Build the control-plane router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(CONNECTIONS_PATH, get(list_connections))
        .route(CLOSE_PATH, post(close_connection))
        .route(SHUTDOWN_PATH, post(shutdown))
        .with_state(state)
}

async fn list_connections(State(state): State<Arc<ServerState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.registry.snapshot())
}

async fn close_connection(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CloseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    match state.registry.lookup(&TunnelId::new(request.id)) {
        Some(handler) => {
            handler.close();
            (StatusCode::OK, Json(StatusBody::new("closed"))).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("connection not found")),
        )
            .into_response(),
    }
}

async fn shutdown(State(state): State<Arc<ServerState>>) -> Json<StatusBody> {
    tracing::info!("shutdown requested over control plane");

    let token = state.shutdown.clone();
    let grace = state.config.shutdown_grace;
    state.tasks.spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(grace) => token.cancel(),
            _ = token.cancelled() => {}
        }
    });

    Json(StatusBody::new("shutting down"))
}
