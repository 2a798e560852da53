//! Orchestration layer between the HTTP handlers and the `Store` /
//! `IndexManager` / `Embedder`.
//!
//! Every mutating operation follows the same order: validate, write the
//! `Store`, invalidate the library's index if the write touched chunk
//! vectors, then persist a snapshot — matching the "write then persist"
//! ordering discussed for the tree this was grounded on (a crash between
//! the store write and the snapshot write loses at most one library's
//! latest change, never corrupts the file).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::embedder::{Embedder, InputType};
use crate::error::{AppError, AppResult};
use crate::index_manager::{IndexDescription, IndexManager, IndexStatusInfo};
use crate::model::{Chunk, ChunkId, Document, DocumentId, IndexerKind, Library, LibraryId};
use crate::snapshot;
use crate::store::Store;

pub struct ServiceFacade {
    store: Arc<Store>,
    index_manager: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: ChunkId,
    pub document: DocumentRef,
    pub text: String,
    pub score: f32,
}

impl ServiceFacade {
    pub fn new(
        store: Arc<Store>,
        index_manager: Arc<IndexManager>,
        embedder: Arc<dyn Embedder>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            index_manager,
            embedder,
            data_dir,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    fn persist(&self, library_id: LibraryId) {
        snapshot::save(&self.store, &self.data_dir, library_id);
    }

    fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    // ---- libraries -----------------------------------------------------

    pub fn create_library(&self, name: String, metadata: HashMap<String, String>) -> AppResult<Library> {
        Self::require_non_empty("name", &name)?;
        let library = self.store.create_library(name, metadata);
        self.persist(library.id);
        Ok(library)
    }

    pub fn get_library(&self, id: LibraryId) -> AppResult<Library> {
        self.store
            .get_library(id)
            .ok_or_else(|| AppError::NotFound(format!("library {id} not found")))
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        self.store.list_libraries()
    }

    /// Metadata-only update. Never touches chunk vectors, so the index (if
    /// any) stays valid and is not invalidated.
    pub fn update_library(
        &self,
        id: LibraryId,
        name: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> AppResult<Library> {
        let current = self.get_library(id)?;
        if current.index_status.indexing_in_progress {
            return Err(AppError::Conflict(format!(
                "library {id} is being indexed; retry after indexing completes"
            )));
        }
        if let Some(name) = &name {
            Self::require_non_empty("name", name)?;
        }
        let updated = self
            .store
            .update_library(id, name, metadata)
            .ok_or_else(|| AppError::NotFound(format!("library {id} not found")))?;
        self.persist(id);
        Ok(updated)
    }

    pub fn delete_library(&self, id: LibraryId) -> AppResult<()> {
        let deleted = self
            .store
            .delete_library(id)
            .ok_or_else(|| AppError::NotFound(format!("library {id} not found")))?;
        self.index_manager.drop_library(deleted.id);
        snapshot::delete_snapshot_file(&self.data_dir, deleted.id);
        Ok(())
    }

    // ---- documents -------------------------------------------------------

    pub fn create_document(
        &self,
        library_id: LibraryId,
        name: String,
        metadata: HashMap<String, String>,
    ) -> AppResult<Document> {
        Self::require_non_empty("name", &name)?;
        if !self.store.library_exists(library_id) {
            return Err(AppError::NotFound(format!("library {library_id} not found")));
        }
        let document = self.store.create_document(library_id, name, metadata);
        self.index_manager.invalidate(library_id, &self.store);
        self.persist(library_id);
        Ok(document)
    }

    pub fn get_document(&self, id: DocumentId) -> AppResult<Document> {
        self.store
            .get_document(id)
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))
    }

    pub fn list_documents(&self, library_id: LibraryId) -> AppResult<Vec<Document>> {
        if !self.store.library_exists(library_id) {
            return Err(AppError::NotFound(format!("library {library_id} not found")));
        }
        Ok(self.store.list_documents_by_library(library_id))
    }

    /// Metadata-only update; does not invalidate the parent library's index.
    pub fn update_document(
        &self,
        id: DocumentId,
        name: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> AppResult<Document> {
        if let Some(name) = &name {
            Self::require_non_empty("name", name)?;
        }
        let existing = self.get_document(id)?;
        let updated = self
            .store
            .update_document(id, name, metadata)
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;
        self.persist(existing.library_id);
        Ok(updated)
    }

    pub fn delete_document(&self, id: DocumentId) -> AppResult<()> {
        let document = self
            .store
            .delete_document(id)
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;
        self.index_manager.invalidate(document.library_id, &self.store);
        self.persist(document.library_id);
        Ok(())
    }

    // ---- chunks ------------------------------------------------------

    pub fn create_chunk(
        &self,
        document_id: DocumentId,
        text: String,
        metadata: HashMap<String, String>,
    ) -> AppResult<Chunk> {
        Self::require_non_empty("text", &text)?;
        let document = self.get_document(document_id)?;
        let chunk = self.store.create_chunk(document_id, text, metadata);
        self.index_manager.invalidate(document.library_id, &self.store);
        self.persist(document.library_id);
        Ok(chunk)
    }

    pub fn create_chunks_batch(
        &self,
        document_id: DocumentId,
        items: Vec<(String, HashMap<String, String>)>,
    ) -> AppResult<Vec<Chunk>> {
        for (text, _) in &items {
            Self::require_non_empty("text", text)?;
        }
        let document = self.get_document(document_id)?;
        let chunks: Vec<Chunk> = items
            .into_iter()
            .map(|(text, metadata)| self.store.create_chunk(document_id, text, metadata))
            .collect();
        self.index_manager.invalidate(document.library_id, &self.store);
        self.persist(document.library_id);
        Ok(chunks)
    }

    pub fn get_chunk(&self, id: ChunkId) -> AppResult<Chunk> {
        self.store
            .get_chunk(id)
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))
    }

    pub fn list_chunks(&self, document_id: DocumentId) -> AppResult<Vec<Chunk>> {
        self.get_document(document_id)?;
        Ok(self.store.list_chunks_by_document(document_id))
    }

    pub fn update_chunk(
        &self,
        id: ChunkId,
        text: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> AppResult<Chunk> {
        if let Some(text) = &text {
            Self::require_non_empty("text", text)?;
        }
        let library_id = self
            .store
            .library_of_chunk(id)
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))?;
        let text_changed = text.is_some();
        let updated = self
            .store
            .update_chunk(id, text, metadata)
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))?;
        if text_changed {
            self.index_manager.invalidate(library_id, &self.store);
        }
        self.persist(library_id);
        Ok(updated)
    }

    pub fn delete_chunk(&self, id: ChunkId) -> AppResult<()> {
        let library_id = self
            .store
            .library_of_chunk(id)
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))?;
        self.store
            .delete_chunk(id)
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))?;
        self.index_manager.invalidate(library_id, &self.store);
        self.persist(library_id);
        Ok(())
    }

    // ---- indexing & search ---------------------------------------------

    pub fn trigger_index(
        &self,
        library_id: LibraryId,
        kind: IndexerKind,
        leaf_size: Option<usize>,
    ) -> AppResult<()> {
        if let Some(leaf_size) = leaf_size {
            if !(10..=1000).contains(&leaf_size) {
                return Err(AppError::Validation(
                    "leaf_size must be between 10 and 1000".into(),
                ));
            }
        }
        let library = self.get_library(library_id)?;
        if library.index_status.indexing_in_progress {
            return Err(AppError::Conflict(format!(
                "library {library_id} is already being indexed"
            )));
        }
        let started = self.index_manager.start_build(
            library_id,
            kind,
            leaf_size,
            self.store.clone(),
            self.embedder.clone(),
        );
        if !started {
            return Err(AppError::Conflict(format!(
                "library {library_id} is already being indexed"
            )));
        }
        Ok(())
    }

    pub fn index_status(&self, library_id: LibraryId) -> AppResult<IndexStatusInfo> {
        let library = self.get_library(library_id)?;
        Ok(self.index_manager.status(library_id, &library))
    }

    pub fn indexer_descriptions(&self) -> Vec<IndexDescription> {
        self.index_manager.indexer_descriptions()
    }

    pub async fn search(
        &self,
        library_id: LibraryId,
        query: &str,
        k: usize,
    ) -> AppResult<Vec<SearchResultItem>> {
        Self::require_non_empty("query", query)?;
        let library = self.get_library(library_id)?;
        if library.index_status.indexing_in_progress {
            return Err(AppError::Conflict("Library is currently being indexed.".into()));
        }
        if !library.index_status.indexed {
            return Err(AppError::Conflict("Library is not indexed.".into()));
        }

        let embeddings = self
            .embedder
            .embed(&[query.to_string()], InputType::Query)
            .await?;
        let query_vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("embedder returned no vector for query".into()))?;

        let hits = self
            .index_manager
            .search(library_id, &query_vector, k)
            .ok_or_else(|| AppError::Conflict("Library is not indexed.".into()))?;

        let items = hits
            .into_iter()
            .filter_map(|hit| {
                let chunk = self.store.get_chunk(hit.chunk_id)?;
                let document = self
                    .store
                    .get_document(chunk.document_id)
                    .unwrap_or_else(Document::deleted_placeholder);
                Some(SearchResultItem {
                    chunk_id: chunk.id,
                    document: DocumentRef {
                        id: if document.id == Uuid::nil() {
                            "<deleted>".to_string()
                        } else {
                            document.id.to_string()
                        },
                        name: document.name.clone(),
                        metadata: document.metadata.clone(),
                    },
                    text: chunk.text.clone(),
                    score: hit.score,
                })
            })
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use tempfile::TempDir;

    use super::*;
    use crate::embedder::DeterministicEmbedder;

    fn facade(data_dir: &std::path::Path) -> ServiceFacade {
        ServiceFacade::new(
            Arc::new(Store::new()),
            Arc::new(IndexManager::new(8)),
            Arc::new(DeterministicEmbedder::new(16)),
            data_dir.to_path_buf(),
        )
    }

    #[test]
    fn create_library_rejects_empty_name() {
        let tmp = TempDir::new().unwrap();
        let facade = facade(tmp.path());
        let err = facade.create_library("  ".into(), StdHashMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn create_document_requires_existing_library() {
        let tmp = TempDir::new().unwrap();
        let facade = facade(tmp.path());
        let err = facade
            .create_document(Uuid::new_v4(), "doc".into(), StdHashMap::new())
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_before_indexing_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let facade = facade(tmp.path());
        let library = facade.create_library("lib".into(), StdHashMap::new()).unwrap();
        let err = facade.search(library.id, "hello", 5).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn full_cycle_index_then_search() {
        let tmp = TempDir::new().unwrap();
        let facade = facade(tmp.path());
        let library = facade.create_library("lib".into(), StdHashMap::new()).unwrap();
        let document = facade
            .create_document(library.id, "doc".into(), StdHashMap::new())
            .unwrap();
        facade
            .create_chunk(document.id, "hello world".into(), StdHashMap::new())
            .unwrap();
        facade
            .create_chunk(document.id, "goodbye world".into(), StdHashMap::new())
            .unwrap();

        facade
            .trigger_index(library.id, IndexerKind::BruteForce, None)
            .unwrap();

        for _ in 0..50 {
            if !facade.index_manager().is_building(library.id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let results = facade.search(library.id, "hello world", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn updating_library_metadata_does_not_invalidate_index_status() {
        let tmp = TempDir::new().unwrap();
        let facade = facade(tmp.path());
        let library = facade.create_library("lib".into(), StdHashMap::new()).unwrap();
        facade
            .store()
            .update_index_status(library.id, |s| {
                s.indexed = true;
                s.indexer_type = Some(IndexerKind::BruteForce);
            });

        let updated = facade
            .update_library(library.id, None, Some(StdHashMap::from([("k".into(), "v".into())])))
            .unwrap();
        assert!(updated.index_status.indexed);
    }
}
