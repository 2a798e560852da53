//! Exact nearest-neighbor indexes over a library's chunk vectors.
//!
//! Two kinds are available — [`linear::LinearIndex`] (brute-force cosine
//! scan) and [`ball_tree::BallTreeIndex`] (Euclidean ball-tree with branch
//! pruning) — both exact, never approximate, per the ball-tree's own
//! `algorithm_properties.exact_search` claim in the indexer this was
//! translated from.

pub mod ball_tree;
pub mod linear;

use crate::model::ChunkId;

/// One scored hit from an index search, in descending score order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// Either concrete index kind, so `IndexManager` can hold one without a
/// trait object or generic parameter leaking into its public API.
pub enum VectorIndex {
    Linear(linear::LinearIndex),
    BallTree(ball_tree::BallTreeIndex),
}

impl VectorIndex {
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        match self {
            VectorIndex::Linear(index) => index.search(query, k),
            VectorIndex::BallTree(index) => index.search(query, k),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VectorIndex::Linear(index) => index.len(),
            VectorIndex::BallTree(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
