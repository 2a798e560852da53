//! In-memory tree of libraries, documents, and chunks.
//!
//! Three logical locks guard three logical tables — `library_lock`,
//! `document_lock`, `chunk_lock` — always acquired in that order, matching
//! the lock discipline of the tree's original database layer. Every getter
//! returns an owned clone rather than a guard, so the lock is never held
//! across a caller's I/O or another lock acquisition.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::{Chunk, ChunkId, Document, DocumentId, Library, LibraryId};

#[derive(Default)]
struct DocumentTable {
    by_id: HashMap<DocumentId, Document>,
    library_of: HashMap<DocumentId, LibraryId>,
}

#[derive(Default)]
struct ChunkTable {
    by_id: HashMap<ChunkId, Chunk>,
    document_of: HashMap<ChunkId, DocumentId>,
}

pub struct Store {
    library_lock: Mutex<HashMap<LibraryId, Library>>,
    document_lock: Mutex<DocumentTable>,
    chunk_lock: Mutex<ChunkTable>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            library_lock: Mutex::new(HashMap::new()),
            document_lock: Mutex::new(DocumentTable::default()),
            chunk_lock: Mutex::new(ChunkTable::default()),
        }
    }

    // ---- libraries ---------------------------------------------------

    pub fn insert_library(&self, library: Library) {
        self.library_lock.lock().insert(library.id, library);
    }

    pub fn create_library(&self, name: String, metadata: HashMap<String, String>) -> Library {
        let library = Library::new(name, metadata);
        self.library_lock.lock().insert(library.id, library.clone());
        library
    }

    pub fn get_library(&self, id: LibraryId) -> Option<Library> {
        self.library_lock.lock().get(&id).cloned()
    }

    pub fn library_exists(&self, id: LibraryId) -> bool {
        self.library_lock.lock().contains_key(&id)
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        self.library_lock.lock().values().cloned().collect()
    }

    /// Replaces a library's name/metadata in place. Never touches
    /// `index_status` — that's `update_index_status`'s job.
    pub fn update_library(
        &self,
        id: LibraryId,
        name: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> Option<Library> {
        let mut guard = self.library_lock.lock();
        let library = guard.get_mut(&id)?;
        if let Some(name) = name {
            library.name = name;
        }
        if let Some(metadata) = metadata {
            library.metadata = metadata;
        }
        Some(library.clone())
    }

    pub fn update_index_status(
        &self,
        id: LibraryId,
        f: impl FnOnce(&mut crate::model::IndexStatus),
    ) -> Option<Library> {
        let mut guard = self.library_lock.lock();
        let library = guard.get_mut(&id)?;
        f(&mut library.index_status);
        Some(library.clone())
    }

    /// Removes the library and cascades to every document and chunk under
    /// it. Returns the deleted library, if it existed.
    pub fn delete_library(&self, id: LibraryId) -> Option<Library> {
        let library = self.library_lock.lock().remove(&id)?;

        let document_ids: Vec<DocumentId> = {
            let mut docs = self.document_lock.lock();
            let ids: Vec<DocumentId> = docs
                .library_of
                .iter()
                .filter(|(_, lib)| **lib == id)
                .map(|(doc, _)| *doc)
                .collect();
            for doc_id in &ids {
                docs.by_id.remove(doc_id);
                docs.library_of.remove(doc_id);
            }
            ids
        };

        let mut chunks = self.chunk_lock.lock();
        let doc_set: std::collections::HashSet<DocumentId> = document_ids.into_iter().collect();
        let chunk_ids: Vec<ChunkId> = chunks
            .document_of
            .iter()
            .filter(|(_, doc)| doc_set.contains(doc))
            .map(|(chunk, _)| *chunk)
            .collect();
        for chunk_id in chunk_ids {
            chunks.by_id.remove(&chunk_id);
            chunks.document_of.remove(&chunk_id);
        }

        Some(library)
    }

    // ---- documents -----------------------------------------------------

    pub fn insert_document(&self, document: Document) {
        let mut guard = self.document_lock.lock();
        guard.library_of.insert(document.id, document.library_id);
        guard.by_id.insert(document.id, document);
    }

    pub fn create_document(
        &self,
        library_id: LibraryId,
        name: String,
        metadata: HashMap<String, String>,
    ) -> Document {
        let document = Document::new(library_id, name, metadata);
        self.insert_document(document.clone());
        document
    }

    pub fn get_document(&self, id: DocumentId) -> Option<Document> {
        self.document_lock.lock().by_id.get(&id).cloned()
    }

    pub fn document_exists(&self, id: DocumentId) -> bool {
        self.document_lock.lock().by_id.contains_key(&id)
    }

    pub fn list_documents_by_library(&self, library_id: LibraryId) -> Vec<Document> {
        self.document_lock
            .lock()
            .by_id
            .values()
            .filter(|d| d.library_id == library_id)
            .cloned()
            .collect()
    }

    pub fn update_document(
        &self,
        id: DocumentId,
        name: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> Option<Document> {
        let mut guard = self.document_lock.lock();
        let document = guard.by_id.get_mut(&id)?;
        if let Some(name) = name {
            document.name = name;
        }
        if let Some(metadata) = metadata {
            document.metadata = metadata;
        }
        Some(document.clone())
    }

    /// Removes the document and cascades to its chunks. Returns the
    /// deleted document, if it existed.
    pub fn delete_document(&self, id: DocumentId) -> Option<Document> {
        let document = {
            let mut guard = self.document_lock.lock();
            guard.library_of.remove(&id);
            guard.by_id.remove(&id)?
        };

        let mut chunks = self.chunk_lock.lock();
        let chunk_ids: Vec<ChunkId> = chunks
            .document_of
            .iter()
            .filter(|(_, doc)| **doc == id)
            .map(|(chunk, _)| *chunk)
            .collect();
        for chunk_id in chunk_ids {
            chunks.by_id.remove(&chunk_id);
            chunks.document_of.remove(&chunk_id);
        }

        Some(document)
    }

    // ---- chunks ----------------------------------------------------------

    pub fn insert_chunk(&self, chunk: Chunk) {
        let mut guard = self.chunk_lock.lock();
        guard.document_of.insert(chunk.id, chunk.document_id);
        guard.by_id.insert(chunk.id, chunk);
    }

    pub fn create_chunk(
        &self,
        document_id: DocumentId,
        text: String,
        metadata: HashMap<String, String>,
    ) -> Chunk {
        let chunk = Chunk::new(document_id, text, metadata);
        self.insert_chunk(chunk.clone());
        chunk
    }

    pub fn get_chunk(&self, id: ChunkId) -> Option<Chunk> {
        self.chunk_lock.lock().by_id.get(&id).cloned()
    }

    pub fn list_chunks_by_document(&self, document_id: DocumentId) -> Vec<Chunk> {
        self.chunk_lock
            .lock()
            .by_id
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect()
    }

    /// All chunks belonging to any document under `library_id`, in no
    /// particular order. Used by index builds.
    pub fn list_chunks_by_library(&self, library_id: LibraryId) -> Vec<Chunk> {
        let document_ids: std::collections::HashSet<DocumentId> = self
            .document_lock
            .lock()
            .by_id
            .values()
            .filter(|d| d.library_id == library_id)
            .map(|d| d.id)
            .collect();

        self.chunk_lock
            .lock()
            .by_id
            .values()
            .filter(|c| document_ids.contains(&c.document_id))
            .cloned()
            .collect()
    }

    pub fn update_chunk(
        &self,
        id: ChunkId,
        text: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> Option<Chunk> {
        let mut guard = self.chunk_lock.lock();
        let chunk = guard.by_id.get_mut(&id)?;
        if let Some(text) = text {
            chunk.text = text;
            chunk.embedding = None;
        }
        if let Some(metadata) = metadata {
            chunk.metadata = metadata;
        }
        Some(chunk.clone())
    }

    pub fn set_chunk_embedding(&self, id: ChunkId, embedding: Vec<f32>) {
        if let Some(chunk) = self.chunk_lock.lock().by_id.get_mut(&id) {
            chunk.embedding = Some(embedding);
        }
    }

    pub fn delete_chunk(&self, id: ChunkId) -> Option<Chunk> {
        let mut guard = self.chunk_lock.lock();
        guard.document_of.remove(&id);
        guard.by_id.remove(&id)
    }

    /// The library a chunk ultimately belongs to, if both it and its parent
    /// document still exist.
    pub fn library_of_chunk(&self, chunk_id: ChunkId) -> Option<LibraryId> {
        let document_id = self.chunk_lock.lock().document_of.get(&chunk_id).copied()?;
        self.document_lock
            .lock()
            .library_of
            .get(&document_id)
            .copied()
    }

    pub fn new_id() -> Uuid {
        Uuid::new_v4()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_delete_removes_documents_and_chunks() {
        let store = Store::new();
        let library = store.create_library("lib".into(), HashMap::new());
        let document = store.create_document(library.id, "doc".into(), HashMap::new());
        let chunk = store.create_chunk(document.id, "hello".into(), HashMap::new());

        store.delete_library(library.id);

        assert!(store.get_library(library.id).is_none());
        assert!(store.get_document(document.id).is_none());
        assert!(store.get_chunk(chunk.id).is_none());
    }

    #[test]
    fn delete_document_cascades_to_chunks_only() {
        let store = Store::new();
        let library = store.create_library("lib".into(), HashMap::new());
        let document = store.create_document(library.id, "doc".into(), HashMap::new());
        let chunk = store.create_chunk(document.id, "hello".into(), HashMap::new());

        store.delete_document(document.id);

        assert!(store.get_library(library.id).is_some());
        assert!(store.get_chunk(chunk.id).is_none());
    }

    #[test]
    fn list_chunks_by_library_crosses_document_boundary() {
        let store = Store::new();
        let library = store.create_library("lib".into(), HashMap::new());
        let doc_a = store.create_document(library.id, "doc".into(), HashMap::new());
        let doc_b = store.create_document(library.id, "doc".into(), HashMap::new());
        store.create_chunk(doc_a.id, "a".into(), HashMap::new());
        store.create_chunk(doc_b.id, "b".into(), HashMap::new());

        let chunks = store.list_chunks_by_library(library.id);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn update_chunk_text_clears_stale_embedding() {
        let store = Store::new();
        let library = store.create_library("lib".into(), HashMap::new());
        let document = store.create_document(library.id, "doc".into(), HashMap::new());
        let chunk = store.create_chunk(document.id, "hello".into(), HashMap::new());
        store.set_chunk_embedding(chunk.id, vec![1.0, 0.0]);

        let updated = store
            .update_chunk(chunk.id, Some("goodbye".into()), None)
            .unwrap();
        assert!(updated.embedding.is_none());
    }
}
