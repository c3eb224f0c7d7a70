use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::{
    AppState, discovery,
    error::{AppError, AppResult},
    models::{ChooseRequest, ChooseResponse},
};

pub async fn choose(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChooseRequest>,
) -> AppResult<Json<ChooseResponse>> {
    let query = req.validate()?;

    let response = discovery::choose(
        &state.db,
        &state.routing,
        &state.gemini,
        &state.config.tz,
        state.config.max_concurrent,
        query,
    )
    .await?;

    Ok(Json(response))
}

pub async fn image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> AppResult<Response> {
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::validation("image key is required"));
    }

    let Some(bytes) = state.cache.get(key).await? else {
        return Err(AppError::not_found("no cached image for that key"));
    };

    Ok(([(header::CONTENT_TYPE, "image/webp")], bytes).into_response())
}
