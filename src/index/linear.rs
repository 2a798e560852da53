//! Exact brute-force cosine-similarity index.
//!
//! Every vector is L2-normalized once at build time so that search reduces
//! to a dot product. A zero vector (degenerate embedding) is left
//! unnormalized rather than divided by zero — it is defined to have norm 1
//! for this purpose, matching a vector that is orthogonal to everything.

use rayon::prelude::*;

use super::SearchHit;
use crate::model::ChunkId;

pub struct LinearIndex {
    rows: Vec<(ChunkId, Vec<f32>)>,
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

impl LinearIndex {
    pub fn build(vectors: Vec<(ChunkId, Vec<f32>)>) -> Self {
        let rows = vectors
            .into_par_iter()
            .map(|(id, vector)| (id, normalize(vector)))
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if self.rows.is_empty() || k == 0 {
            return Vec::new();
        }
        let query = normalize(query.to_vec());

        let mut scored: Vec<SearchHit> = self
            .rows
            .par_iter()
            .map(|(id, vector)| {
                let score = vector
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                SearchHit {
                    chunk_id: *id,
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k.min(scored.len()));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn finds_exact_match_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let index = LinearIndex::build(vec![
            (a, vec![1.0, 0.0, 0.0]),
            (b, vec![0.0, 1.0, 0.0]),
        ]);

        let hits = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits[0].chunk_id, a);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn k_is_clamped_to_available_rows() {
        let a = Uuid::new_v4();
        let index = LinearIndex::build(vec![(a, vec![1.0, 0.0])]);
        let hits = index.search(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn zero_vector_does_not_panic() {
        let a = Uuid::new_v4();
        let index = LinearIndex::build(vec![(a, vec![0.0, 0.0, 0.0])]);
        let hits = index.search(&[0.0, 0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }
}
