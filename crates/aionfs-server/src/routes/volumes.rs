//! Volume routes: `/v1/volumes/*`
//!
//! Volume CRUD, attach/detach and per-volume snapshot history.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use aionfs_core::auth::Caller;
use aionfs_core::lifecycle::{
    AttachVolume, CreateSnapshot, CreateVolume, DetachVolume, UpdateVolume,
};
use aionfs_core::model::{Snapshot, Volume};

use super::{Body, decode};
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/volumes` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_volume).get(list_volumes))
        .route(
            "/{volume_id}",
            get(get_volume).patch(update_volume).delete(delete_volume),
        )
        .route("/{volume_id}/attach", post(attach_volume))
        .route("/{volume_id}/detach", post(detach_volume))
        .route(
            "/{volume_id}/snapshots",
            post(create_snapshot).get(list_snapshots),
        )
}

async fn create_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<(StatusCode, Json<Volume>), AppError> {
    let req: CreateVolume = decode(&body, Body::Required)?;
    let volume = state.lifecycle.create_volume(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(volume)))
}

async fn list_volumes(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Volume>>, AppError> {
    Ok(Json(state.lifecycle.list_volumes(&caller).await?))
}

async fn get_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
) -> Result<Json<Volume>, AppError> {
    Ok(Json(state.lifecycle.get_volume(&caller, &volume_id).await?))
}

async fn update_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
    body: Bytes,
) -> Result<Json<Volume>, AppError> {
    let req: UpdateVolume = decode(&body, Body::Required)?;
    Ok(Json(
        state
            .lifecycle
            .update_volume(&caller, &volume_id, req)
            .await?,
    ))
}

async fn delete_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.lifecycle.delete_volume(&caller, &volume_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn attach_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
    body: Bytes,
) -> Result<Json<Volume>, AppError> {
    let req: AttachVolume = decode(&body, Body::Required)?;
    Ok(Json(state.lifecycle.attach(&caller, &volume_id, req).await?))
}

async fn detach_volume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
    body: Bytes,
) -> Result<Json<Volume>, AppError> {
    let req: DetachVolume = decode(&body, Body::Optional)?;
    Ok(Json(state.lifecycle.detach(&caller, &volume_id, req).await?))
}

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Snapshot>), AppError> {
    let req: CreateSnapshot = decode(&body, Body::Optional)?;
    let snapshot = state
        .lifecycle
        .add_snapshot(&caller, &volume_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(volume_id): Path<String>,
) -> Result<Json<Vec<Snapshot>>, AppError> {
    Ok(Json(
        state.lifecycle.list_snapshots(&caller, &volume_id).await?,
    ))
}
