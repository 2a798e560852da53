//! Per-library index lifecycle: build, invalidate, search, describe.
//!
//! One build per library runs at a time, guarded the same way the
//! teacher's indexer serializes per-workspace work: a `compare_exchange`
//! on an `AtomicBool` claims the right to build, and an `IndexGuard`
//! resets it on `Drop` so a panicking build never wedges the library.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::embedder::{Embedder, InputType};
use crate::index::{ball_tree::BallTreeIndex, linear::LinearIndex, SearchHit, VectorIndex};
use crate::model::{IndexerKind, LibraryId};
use crate::store::Store;

struct IndexSlot {
    index: Option<Arc<VectorIndex>>,
    building: Arc<AtomicBool>,
    leaf_size: Option<usize>,
}

impl Default for IndexSlot {
    fn default() -> Self {
        Self {
            index: None,
            building: Arc::new(AtomicBool::new(false)),
            leaf_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusInfo {
    pub indexed: bool,
    pub indexer_type: Option<IndexerKind>,
    pub vector_count: usize,
    pub indexing_in_progress: bool,
    pub leaf_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmProperties {
    pub exact_search: bool,
    pub complexity: &'static str,
    pub distance_metric: &'static str,
    pub space_partitioning: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexDescription {
    pub name: &'static str,
    pub description: &'static str,
    pub indexed_libraries: usize,
    pub total_vectors: usize,
    pub leaf_size: Option<usize>,
    pub algorithm_properties: AlgorithmProperties,
}

struct IndexGuard(Arc<AtomicBool>);

impl Drop for IndexGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct IndexManager {
    slots: DashMap<LibraryId, IndexSlot>,
    default_leaf_size: usize,
}

impl IndexManager {
    pub fn new(default_leaf_size: usize) -> Self {
        Self {
            slots: DashMap::new(),
            default_leaf_size,
        }
    }

    pub fn status(&self, library_id: LibraryId, library: &crate::model::Library) -> IndexStatusInfo {
        let slot = self.slots.get(&library_id);
        let vector_count = slot
            .as_ref()
            .and_then(|slot| slot.index.as_ref().map(|idx| idx.len()))
            .unwrap_or(0);
        let leaf_size = slot.as_ref().and_then(|slot| slot.leaf_size);
        IndexStatusInfo {
            indexed: library.index_status.indexed,
            indexer_type: library.index_status.indexer_type,
            vector_count,
            indexing_in_progress: library.index_status.indexing_in_progress,
            leaf_size,
        }
    }

    pub fn is_building(&self, library_id: LibraryId) -> bool {
        self.slots
            .get(&library_id)
            .map(|slot| slot.building.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn search(&self, library_id: LibraryId, query: &[f32], k: usize) -> Option<Vec<SearchHit>> {
        let slot = self.slots.get(&library_id)?;
        let index = slot.index.as_ref()?;
        Some(index.search(query, k))
    }

    /// Drops the in-memory index and marks the library unindexed, keeping
    /// `indexer_type`/`last_indexed` if it was previously indexed — a
    /// metadata-only change should not erase the history of what indexer
    /// was last built and when.
    pub fn invalidate(&self, library_id: LibraryId, store: &Store) {
        if let Some(mut slot) = self.slots.get_mut(&library_id) {
            slot.index = None;
        }
        store.update_index_status(library_id, |status| {
            if status.indexed {
                status.indexed = false;
            }
            status.indexing_in_progress = false;
        });
    }

    pub fn drop_library(&self, library_id: LibraryId) {
        self.slots.remove(&library_id);
    }

    /// Starts a background build for `library_id` using `kind`. Returns
    /// `false` without spawning anything if a build for this library is
    /// already in flight.
    pub fn start_build(
        self: &Arc<Self>,
        library_id: LibraryId,
        kind: IndexerKind,
        leaf_size: Option<usize>,
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
    ) -> bool {
        let leaf_size = leaf_size.unwrap_or(self.default_leaf_size);
        let building = {
            let mut slot = self.slots.entry(library_id).or_default();
            slot.leaf_size = Some(leaf_size);
            slot.building.clone()
        };

        if building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        store.update_index_status(library_id, |status| {
            status.indexing_in_progress = true;
            status.indexed = false;
            status.indexer_type = Some(kind);
        });

        let manager = self.clone();
        tokio::spawn(async move {
            let _guard = IndexGuard(building);
            manager.run_build(library_id, kind, leaf_size, store, embedder).await;
        });

        true
    }

    async fn run_build(
        self: Arc<Self>,
        library_id: LibraryId,
        kind: IndexerKind,
        leaf_size: usize,
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
    ) {
        let chunks = store.list_chunks_by_library(library_id);
        info!(%library_id, chunks = chunks.len(), kind = kind.as_str(), "starting index build");

        let missing: Vec<(usize, String)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_none())
            .map(|(i, c)| (i, c.text.clone()))
            .collect();

        let mut embeddings: HashMap<usize, Vec<f32>> = HashMap::new();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|(_, t)| t.clone()).collect();
            match embedder.embed(&texts, InputType::Document).await {
                Ok(vectors) => {
                    for ((idx, _), vector) in missing.into_iter().zip(vectors) {
                        store.set_chunk_embedding(chunks[idx].id, vector.clone());
                        embeddings.insert(idx, vector);
                    }
                }
                Err(e) => {
                    warn!(%library_id, error = %e, "index build failed while embedding chunks");
                    self.slots.entry(library_id).or_default().index = None;
                    store.update_index_status(library_id, |status| {
                        status.indexed = false;
                        status.indexer_type = None;
                        status.indexing_in_progress = false;
                    });
                    return;
                }
            }
        }

        let vectors: Vec<(crate::model::ChunkId, Vec<f32>)> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let vector = chunk
                    .embedding
                    .clone()
                    .or_else(|| embeddings.get(&i).cloned())
                    .unwrap_or_default();
                (chunk.id, vector)
            })
            .collect();

        let installed = match kind {
            IndexerKind::BruteForce => VectorIndex::Linear(LinearIndex::build(vectors)),
            IndexerKind::BallTree => VectorIndex::BallTree(BallTreeIndex::build(vectors, leaf_size)),
        };
        let count = installed.len();

        self.slots.entry(library_id).or_default().index = Some(Arc::new(installed));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        store.update_index_status(library_id, |status| {
            status.indexed = true;
            status.indexer_type = Some(kind);
            status.last_indexed = Some(now);
            status.indexing_in_progress = false;
        });

        info!(%library_id, vectors = count, kind = kind.as_str(), "index build complete");
    }

    /// Aggregate description of each indexer kind currently installed
    /// across all libraries, mirroring the original indexer's
    /// introspection endpoint.
    pub fn indexer_descriptions(&self) -> Vec<IndexDescription> {
        let mut brute_force = (0usize, 0usize);
        let mut ball_tree = (0usize, 0usize);

        for entry in self.slots.iter() {
            if let Some(index) = &entry.value().index {
                match index.as_ref() {
                    VectorIndex::Linear(i) => {
                        brute_force.0 += 1;
                        brute_force.1 += i.len();
                    }
                    VectorIndex::BallTree(i) => {
                        ball_tree.0 += 1;
                        ball_tree.1 += i.len();
                    }
                }
            }
        }

        vec![
            IndexDescription {
                name: "BRUTE_FORCE",
                description: "Exact linear cosine-similarity scan",
                indexed_libraries: brute_force.0,
                total_vectors: brute_force.1,
                leaf_size: None,
                algorithm_properties: AlgorithmProperties {
                    exact_search: true,
                    complexity: "O(n) per query",
                    distance_metric: "cosine",
                    space_partitioning: "none",
                },
            },
            IndexDescription {
                name: "BALL_TREE",
                description: "Exact Euclidean ball-tree with branch pruning",
                indexed_libraries: ball_tree.0,
                total_vectors: ball_tree.1,
                leaf_size: Some(self.default_leaf_size),
                algorithm_properties: AlgorithmProperties {
                    exact_search: true,
                    complexity: "O(log n) average case",
                    distance_metric: "euclidean",
                    space_partitioning: "ball_tree",
                },
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use super::*;
    use crate::embedder::DeterministicEmbedder;

    #[tokio::test]
    async fn build_then_search_round_trips() {
        let store = Arc::new(Store::new());
        let library = store.create_library("lib".into(), StdHashMap::new());
        let document = store.create_document(library.id, "doc".into(), StdHashMap::new());
        store.create_chunk(document.id, "hello world".into(), StdHashMap::new());
        store.create_chunk(document.id, "goodbye world".into(), StdHashMap::new());

        let manager = Arc::new(IndexManager::new(40));
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(16));

        assert!(manager.start_build(library.id, IndexerKind::BruteForce, None, store.clone(), embedder));

        for _ in 0..50 {
            if !manager.is_building(library.id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let library = store.get_library(library.id).unwrap();
        assert!(library.index_status.indexed);
        let status = manager.status(library.id, &library);
        assert_eq!(status.vector_count, 2);

        let hits = manager.search(library.id, &[1.0; 16], 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_build_request_is_rejected() {
        let store = Arc::new(Store::new());
        let library = store.create_library("lib".into(), StdHashMap::new());
        let manager = Arc::new(IndexManager::new(40));
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(8));

        assert!(manager.start_build(library.id, IndexerKind::BruteForce, None, store.clone(), embedder.clone()));
        assert!(!manager.start_build(library.id, IndexerKind::BruteForce, None, store.clone(), embedder));
    }
}
