use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct DidResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebfingerQuery {
    resource: String,
}

pub async fn did_json(State(state): State<AppState>) -> Json<DidResponse> {
    Json(DidResponse {
        id: state.authorizer().service_did().to_string(),
    })
}

pub async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebfingerQuery>,
) -> AppResult<Json<DidResponse>> {
    let id = state
        .registry
        .resolve_name(&query.resource)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "user not found"))?;
    Ok(Json(DidResponse { id }))
}
