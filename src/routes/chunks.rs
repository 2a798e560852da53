use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Chunk;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChunkRequest {
    pub document_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChunkBatchRequest {
    pub document_id: Uuid,
    pub chunks: Vec<BatchChunkItem>,
}

#[derive(Debug, Deserialize)]
pub struct BatchChunkItem {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChunkRequest {
    pub text: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

pub async fn create_chunk(
    State(state): State<AppState>,
    Json(req): Json<CreateChunkRequest>,
) -> AppResult<(StatusCode, Json<Chunk>)> {
    let chunk = state.facade.create_chunk(req.document_id, req.text, req.metadata)?;
    Ok((StatusCode::CREATED, Json(chunk)))
}

pub async fn create_chunks_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateChunkBatchRequest>,
) -> AppResult<(StatusCode, Json<Vec<Chunk>>)> {
    let items = req.chunks.into_iter().map(|c| (c.text, c.metadata)).collect();
    let chunks = state.facade.create_chunks_batch(req.document_id, items)?;
    Ok((StatusCode::CREATED, Json(chunks)))
}

pub async fn get_chunk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Chunk>> {
    Ok(Json(state.facade.get_chunk(id)?))
}

pub async fn list_chunks_by_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<Chunk>>> {
    Ok(Json(state.facade.list_chunks(document_id)?))
}

/// Rejects a `document_id` field on the raw body only when its value
/// differs from the chunk's current parent — resending the unchanged id
/// alongside a real field change is a no-op, not a reparent attempt.
pub async fn update_chunk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(raw): Json<serde_json::Value>,
) -> AppResult<Json<Chunk>> {
    if let Some(new_document_id) = raw.get("document_id") {
        let current = state.facade.get_chunk(id)?;
        let unchanged = new_document_id
            .as_str()
            .map(|s| s == current.document_id.to_string())
            .unwrap_or(false);
        if !unchanged {
            return Err(AppError::Validation("Cannot change document_id".into()));
        }
    }
    let req: UpdateChunkRequest = serde_json::from_value(raw)?;
    Ok(Json(state.facade.update_chunk(id, req.text, req.metadata)?))
}

pub async fn delete_chunk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.facade.delete_chunk(id)?;
    Ok(StatusCode::NO_CONTENT)
}
