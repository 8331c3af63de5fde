use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bsky_car::MIME_TYPE;
use bsky_repo::dag;
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::error::{AppError, AppResult};
use crate::{state::AppState, sync};

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn bearer(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(AppError::unauthorized)
}

fn body_reader(body: Body) -> impl tokio::io::AsyncRead + Send + Unpin {
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    StreamReader::new(stream)
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> AppResult<impl IntoResponse> {
    let token = bearer(&headers)?;
    let user = sync::register(&state, token, body_reader(body)).await?;
    debug!(did = %user.did, "registered");
    Ok(Json(json!({ "OK": true })))
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> AppResult<impl IntoResponse> {
    let token = bearer(&headers)?;
    let root = sync::update(&state, token, body_reader(body)).await?;
    Ok(Json(json!({ "OK": true, "root": root.to_string() })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let root = state.registry.lookup(&id)?;
    let mut buf = Vec::new();
    dag::export(state.store.as_ref(), root, &mut buf)
        .await
        .map_err(sync::UpdateError::from)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, MIME_TYPE)],
        buf,
    ))
}
