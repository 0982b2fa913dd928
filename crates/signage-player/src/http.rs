use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::board::{Board, ScreenSnapshot};

#[derive(Clone)]
struct HttpState {
    board: Arc<Board>,
}

#[derive(Serialize)]
struct ApiState {
    /// `None` until the first session has published.
    screen: Option<ScreenSnapshot>,
    rev: u64,
    warnings: Vec<String>,
}

pub fn router(board: Arc<Board>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/fields/:id", get(get_field))
        .route("/api/reload", post(reload))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { board })
}

pub fn start_server(bind_address: String, port: u16, board: Arc<Board>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(board);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("Board API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    Json(ApiState {
        screen: state.board.snapshot(),
        rev: state.board.rev(),
        warnings: state.board.warnings(),
    })
}

async fn get_field(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    match state.board.markup(&id) {
        Some(markup) => ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], markup).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn reload(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: reload");
    state.board.request_reload();
    StatusCode::ACCEPTED
}
