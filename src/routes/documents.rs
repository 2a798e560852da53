use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Document;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub library_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

pub async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let document = state
        .facade
        .create_document(req.library_id, req.name, req.metadata)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    Ok(Json(state.facade.get_document(id)?))
}

pub async fn list_documents_by_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    Ok(Json(state.facade.list_documents(library_id)?))
}

/// Rejects a `library_id` field on the raw body only when its value
/// differs from the document's current parent — resending the unchanged
/// id alongside a real field change is a no-op, not a rename attempt.
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(raw): Json<serde_json::Value>,
) -> AppResult<Json<Document>> {
    if let Some(new_library_id) = raw.get("library_id") {
        let current = state.facade.get_document(id)?;
        let unchanged = new_library_id
            .as_str()
            .map(|s| s == current.library_id.to_string())
            .unwrap_or(false);
        if !unchanged {
            return Err(AppError::Validation("Cannot change library_id".into()));
        }
    }
    let req: UpdateDocumentRequest = serde_json::from_value(raw)?;
    Ok(Json(state.facade.update_document(id, req.name, req.metadata)?))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.facade.delete_document(id)?;
    Ok(StatusCode::NO_CONTENT)
}
