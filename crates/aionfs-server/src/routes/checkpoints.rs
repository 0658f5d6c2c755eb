//! Checkpoint routes: `/v1/checkpoints`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};

use aionfs_core::auth::Caller;
use aionfs_core::lifecycle::CreateCheckpoint;
use aionfs_core::model::CheckpointManifest;

use super::{Body, decode};
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/checkpoints` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(create_checkpoint).get(list_checkpoints))
}

/// Pin the latest snapshot of each requested volume, creating one where
/// none exists yet.
async fn create_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<(StatusCode, Json<CheckpointManifest>), AppError> {
    let req: CreateCheckpoint = decode(&body, Body::Required)?;
    let manifest = state.lifecycle.create_checkpoint(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(manifest)))
}

async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<CheckpointManifest>>, AppError> {
    Ok(Json(state.lifecycle.list_checkpoints(&caller).await?))
}
