//! JSON-on-disk persistence, one file per library.
//!
//! `save` copies out of the `Store` under brief lock scopes and does all
//! file I/O with no lock held, matching the original database layer's
//! persistence module. `load_library_from_file` tolerates malformed
//! individual document/chunk records — it skips and warns rather than
//! failing the whole load, since a single bad record shouldn't cost the
//! rest of the library.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::model::{Chunk, Document, Library, LibraryId};
use crate::store::Store;

#[derive(serde::Serialize)]
struct SnapshotData<'a> {
    library: &'a Library,
    documents: &'a [Document],
    chunks: &'a [Chunk],
}

pub fn library_file_path(data_dir: &Path, library_id: LibraryId) -> PathBuf {
    data_dir.join(format!("library_{library_id}.json"))
}

/// Writes the current state of a library (and everything under it) to its
/// snapshot file, stripping chunk embeddings. Best-effort: logs and
/// returns `false` on any failure rather than propagating one, matching
/// the original persistence layer's "never let a save error break the
/// request" behavior.
pub fn save(store: &Store, data_dir: &Path, library_id: LibraryId) -> bool {
    let library = match store.get_library(library_id) {
        Some(library) => library,
        None => {
            warn!(%library_id, "cannot save library: not found");
            return false;
        }
    };

    let documents = store.list_documents_by_library(library_id);
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| store.list_chunks_by_document(doc.id))
        .map(|chunk| chunk.without_embedding())
        .collect();

    if let Err(e) = fs::create_dir_all(data_dir) {
        warn!(%library_id, error = %e, "cannot create data directory");
        return false;
    }

    let data = SnapshotData {
        library: &library,
        documents: &documents,
        chunks: &chunks,
    };

    let json = match serde_json::to_vec_pretty(&data) {
        Ok(json) => json,
        Err(e) => {
            warn!(%library_id, error = %e, "failed to serialize snapshot");
            return false;
        }
    };

    let path = library_file_path(data_dir, library_id);
    let tmp_path = path.with_extension("json.tmp");

    if let Err(e) = fs::write(&tmp_path, &json) {
        warn!(%library_id, error = %e, "failed to write snapshot tmp file");
        return false;
    }
    if let Err(e) = fs::rename(&tmp_path, &path) {
        warn!(%library_id, error = %e, "failed to rename snapshot into place");
        return false;
    }

    info!(
        %library_id,
        documents = documents.len(),
        chunks = chunks.len(),
        path = %path.display(),
        "saved library snapshot"
    );
    true
}

/// Best-effort removal of a library's snapshot file. Failure is logged,
/// never propagated — callers treat this as cleanup, not a guarantee.
pub fn delete_snapshot_file(data_dir: &Path, library_id: LibraryId) {
    let path = library_file_path(data_dir, library_id);
    match fs::remove_file(&path) {
        Ok(()) => info!(%library_id, path = %path.display(), "removed snapshot file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(%library_id, error = %e, "failed to remove snapshot file"),
    }
}

/// Loads a single library (and its documents/chunks) from a snapshot file
/// directly into the store, preserving original IDs. Returns `false`
/// (logging a warning) if the file is missing, unreadable, or the
/// top-level `library` record is malformed.
pub fn load_library_from_file(store: &Store, path: &Path) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read snapshot file");
            return false;
        }
    };

    let data: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid JSON in snapshot file");
            return false;
        }
    };

    let library_value = match data.get("library").filter(|v| v.get("id").is_some()) {
        Some(value) => value,
        None => {
            warn!(path = %path.display(), "invalid library data in file");
            return false;
        }
    };

    let mut library: Library = match serde_json::from_value(library_value.clone()) {
        Ok(library) => library,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid library data in file");
            return false;
        }
    };
    let library_id = library.id;
    // No index is rebuilt on load; a persisted `indexed=true` would lie
    // about there being an installed index in this process.
    library.index_status.indexed = false;
    library.index_status.indexing_in_progress = false;
    store.insert_library(library);

    for doc_value in data
        .get("documents")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
    {
        if doc_value.get("id").is_none() || doc_value.get("library_id").is_none() {
            warn!(path = %path.display(), "invalid document data in file");
            continue;
        }
        match serde_json::from_value::<Document>(doc_value.clone()) {
            Ok(document) => store.insert_document(document),
            Err(e) => warn!(path = %path.display(), error = %e, "invalid document data in file"),
        }
    }

    for chunk_value in data
        .get("chunks")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
    {
        if chunk_value.get("id").is_none() || chunk_value.get("document_id").is_none() {
            warn!(path = %path.display(), "invalid chunk data in file");
            continue;
        }
        let mut chunk_value = chunk_value.clone();
        if let Some(obj) = chunk_value.as_object_mut() {
            obj.remove("embedding");
        }
        match serde_json::from_value::<Chunk>(chunk_value) {
            Ok(chunk) => store.insert_chunk(chunk),
            Err(e) => warn!(path = %path.display(), error = %e, "invalid chunk data in file"),
        }
    }

    info!(%library_id, path = %path.display(), "loaded library from snapshot");
    true
}

/// Scans `data_dir` for `library_*.json` snapshots and loads each into the
/// store. Returns the number of libraries successfully loaded.
pub fn load_all(store: &Store, data_dir: &Path) -> usize {
    if let Err(e) = fs::create_dir_all(data_dir) {
        warn!(error = %e, "cannot create data directory");
        return 0;
    }

    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "cannot list data directory");
            return 0;
        }
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with("library_") || !file_name.ends_with(".json") {
            continue;
        }
        if load_library_from_file(store, &entry.path()) {
            count += 1;
        }
    }

    info!(count, "loaded libraries from data directory");
    count
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn save_then_load_round_trips_and_strips_embeddings() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new();
        let library = store.create_library("lib".into(), HashMap::new());
        let document = store.create_document(library.id, "doc".into(), HashMap::new());
        let chunk = store.create_chunk(document.id, "hello".into(), HashMap::new());
        store.set_chunk_embedding(chunk.id, vec![1.0, 2.0, 3.0]);

        assert!(save(&store, tmp.path(), library.id));

        let reloaded = Store::new();
        let path = library_file_path(tmp.path(), library.id);
        assert!(load_library_from_file(&reloaded, &path));

        let loaded_chunk = reloaded.get_chunk(chunk.id).unwrap();
        assert_eq!(loaded_chunk.text, "hello");
        assert!(loaded_chunk.embedding.is_none());
        assert!(reloaded.get_document(document.id).is_some());
    }

    #[test]
    fn save_missing_library_returns_false() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new();
        assert!(!save(&store, tmp.path(), uuid::Uuid::new_v4()));
    }

    #[test]
    fn load_skips_malformed_chunk_but_keeps_library() {
        let tmp = TempDir::new().unwrap();
        let library_id = uuid::Uuid::new_v4();
        let path = library_file_path(tmp.path(), library_id);
        let body = serde_json::json!({
            "library": {"id": library_id, "name": "lib", "metadata": {}, "index_status": {}},
            "documents": [],
            "chunks": [{"id": "not-a-valid-chunk"}],
        });
        fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();

        let store = Store::new();
        assert!(load_library_from_file(&store, &path));
        assert!(store.get_library(library_id).is_some());
    }
}
