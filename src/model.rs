use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type LibraryId = Uuid;
pub type DocumentId = Uuid;
pub type ChunkId = Uuid;

/// The indexer kind installed for a library. `BruteForce` is the exact
/// linear cosine scan; `BallTree` is the exact Euclidean ball-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexerKind {
    BruteForce,
    BallTree,
}

impl IndexerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexerKind::BruteForce => "BRUTE_FORCE",
            IndexerKind::BallTree => "BALL_TREE",
        }
    }
}

/// Indexing status carried on a `Library`, persisted verbatim across
/// snapshot save/load (nothing here is recomputed on load).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStatus {
    pub indexed: bool,
    pub indexer_type: Option<IndexerKind>,
    /// Unix timestamp (seconds) of the last successful build.
    pub last_indexed: Option<f64>,
    pub indexing_in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    /// Present only in memory; `Snapshot::save` strips this before writing
    /// to disk and it is absent again after `Snapshot::load`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn new(document_id: DocumentId, text: String, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            text,
            embedding: None,
            metadata,
        }
    }

    /// A copy of this chunk with `embedding` cleared, suitable for writing
    /// to a snapshot file.
    pub fn without_embedding(&self) -> Chunk {
        Chunk {
            embedding: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub library_id: LibraryId,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(library_id: LibraryId, name: String, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            library_id,
            name,
            metadata,
        }
    }

    /// A placeholder used when search results reference a document whose
    /// parent was deleted out from under a stale index.
    pub fn deleted_placeholder() -> Document {
        Document {
            id: Uuid::nil(),
            library_id: Uuid::nil(),
            name: "<deleted>".to_string(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub index_status: IndexStatus,
}

impl Library {
    pub fn new(name: String, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            metadata,
            index_status: IndexStatus::default(),
        }
    }
}
