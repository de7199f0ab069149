use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;

use crate::parser::Post;
use crate::reader::RssReader;
use crate::store::{get_state, set_state, KeyValueStore};

pub struct AppState {
    pub reader: Arc<RssReader>,
    pub store: Arc<dyn KeyValueStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/episodes", get(episodes))
        .route("/state/:key", get(read_state).put(write_state))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

// Route handlers
pub async fn episodes(State(state): State<Arc<AppState>>) -> Json<Vec<Post>> {
    Json(state.reader.get_items().await)
}

pub async fn read_state(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Map<String, Value>>, AppError> {
    let value = get_state(state.store.as_ref(), &key).await?;
    Ok(Json(value))
}

pub async fn write_state(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>, AppError> {
    let merged = set_state(state.store.as_ref(), &key, patch).await?;
    Ok(Json(merged))
}

pub async fn health() -> &'static str {
    "OK"
}
