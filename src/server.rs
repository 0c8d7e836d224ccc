//! JSON HTTP API.
//!
//! Runs the periodic refresh loop in the background and exposes the catalog
//! and the refresh controller over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/api/status` | Controller state and last refresh result |
//! | `POST`   | `/api/refresh` | Start a scan now (409 if one is running) |
//! | `GET`    | `/api/search?q=&limit=&offset=` | Search the catalog |
//! | `GET`    | `/api/count` | Number of cataloged books |
//! | `GET`    | `/api/books/{hash}` | One book |
//! | `DELETE` | `/api/books/{hash}` | Delete a book and its assets |
//! | `GET`    | `/api/exists/{author}/{title}` | Presence check |
//! | `GET`    | `/api/refreshes?limit=` | Refresh history, newest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "book not found: mccarthytheroad" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `already_running` (409),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::config::Config;
use crate::error::IngestError;
use crate::library::Library;
use crate::models::{BookRecord, RefreshResult, SearchPage};
use crate::refresh::{RefreshController, RefreshStatus, HISTORY_LIMIT};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    controller: Arc<RefreshController>,
    library: Library,
}

/// Start the refresh loop and serve the API on `[server].bind` until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let controller = app.controller();
    let refresh_loop = tokio::spawn(controller.clone().run());

    let router = router(controller.clone(), app.library());
    let bind_addr = config.server.bind.clone();
    println!("booksing listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let shutdown_controller = controller.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown_controller.shutdown();
        })
        .await?;

    controller.shutdown();
    if let Err(e) = refresh_loop.await {
        tracing::error!(error = %e, "refresh loop panicked");
    }
    Ok(())
}

/// Build the API router.
pub fn router(controller: Arc<RefreshController>, library: Library) -> Router {
    let state = AppState {
        controller,
        library,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/refresh", post(handle_refresh))
        .route("/api/search", get(handle_search))
        .route("/api/count", get(handle_count))
        .route("/api/books/{hash}", get(handle_get).delete(handle_delete))
        .route("/api/exists/{author}/{title}", get(handle_exists))
        .route("/api/refreshes", get(handle_refreshes))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_status(State(state): State<AppState>) -> Json<RefreshStatus> {
    Json(state.controller.status())
}

async fn handle_refresh(State(state): State<AppState>) -> Result<Response, AppError> {
    match state.controller.trigger() {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "started" })),
        )
            .into_response()),
        Err(e @ IngestError::RefreshAlreadyRunning) => Err(AppError {
            status: StatusCode::CONFLICT,
            code: "already_running".to_string(),
            message: e.to_string(),
        }),
        Err(e) => Err(internal(e.into())),
    }
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPage>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    let page = state
        .library
        .search(&params.q, limit, params.offset)
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

async fn handle_count(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.library.count().await.map_err(internal)?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<BookRecord>, AppError> {
    match state.library.get(&hash).await.map_err(internal)? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(format!("book not found: {}", hash))),
    }
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.library.delete(&hash).await.map_err(internal)? {
        Ok(Json(serde_json::json!({ "deleted": hash })))
    } else {
        Err(not_found(format!("book not found: {}", hash)))
    }
}

async fn handle_exists(
    State(state): State<AppState>,
    Path((author, title)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let exists = state
        .library
        .exists(&author, &title)
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({
        "exists": exists,
        "identity_hash": Library::identity_for(&author, &title),
    })))
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn handle_refreshes(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<RefreshResult>>, AppError> {
    let limit = params.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
    let history = state
        .library
        .backend()
        .refreshes(limit)
        .await
        .map_err(internal)?;
    Ok(Json(history))
}
