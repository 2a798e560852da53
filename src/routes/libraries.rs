use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{IndexerKind, Library};
use crate::service::SearchResultItem;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChunkNested {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentNested {
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub chunks: Vec<CreateChunkNested>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLibraryRequest {
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub documents: Vec<CreateDocumentNested>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLibraryRequest {
    pub name: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerIndexRequest {
    pub indexer_type: IndexerKind,
    pub leaf_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query_text: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

/// `documents` is only accepted on create; a `PATCH` carrying it is rejected
/// before it ever reaches the facade.
pub async fn create_library(
    State(state): State<AppState>,
    Json(req): Json<CreateLibraryRequest>,
) -> AppResult<(StatusCode, Json<Library>)> {
    let library = state.facade.create_library(req.name, req.metadata)?;

    for doc in req.documents {
        let document = state
            .facade
            .create_document(library.id, doc.name, doc.metadata)?;
        if !doc.chunks.is_empty() {
            let items = doc.chunks.into_iter().map(|c| (c.text, c.metadata)).collect();
            state.facade.create_chunks_batch(document.id, items)?;
        }
    }

    let library = state.facade.get_library(library.id)?;
    Ok((StatusCode::CREATED, Json(library)))
}

pub async fn list_libraries(State(state): State<AppState>) -> Json<Vec<Library>> {
    Json(state.facade.list_libraries())
}

pub async fn get_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Library>> {
    Ok(Json(state.facade.get_library(id)?))
}

/// Raw-JSON inspected ahead of the typed body so a `documents` field is
/// rejected with a validation error instead of silently ignored by serde.
pub async fn update_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(raw): Json<serde_json::Value>,
) -> AppResult<Json<Library>> {
    if raw.get("documents").is_some() {
        return Err(AppError::Validation(
            "Cannot set documents via library update".into(),
        ));
    }
    let req: UpdateLibraryRequest = serde_json::from_value(raw)?;
    Ok(Json(state.facade.update_library(id, req.name, req.metadata)?))
}

pub async fn delete_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.facade.delete_library(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn trigger_index(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TriggerIndexRequest>,
) -> AppResult<Json<crate::index_manager::IndexStatusInfo>> {
    state
        .facade
        .trigger_index(id, req.indexer_type, req.leaf_size)?;
    Ok(Json(state.facade.index_status(id)?))
}

pub async fn index_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<crate::index_manager::IndexStatusInfo>> {
    Ok(Json(state.facade.index_status(id)?))
}

/// Per-indexer-kind introspection (build parameters, aggregate vectors
/// indexed, algorithm properties), independent of any single library.
pub async fn list_indexer_descriptions(
    State(state): State<AppState>,
) -> Json<Vec<crate::index_manager::IndexDescription>> {
    Json(state.facade.indexer_descriptions())
}

pub async fn search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<SearchResultItem>>> {
    let results = state
        .facade
        .search(id, &params.query_text, params.top_k)
        .await?;
    Ok(Json(results))
}
