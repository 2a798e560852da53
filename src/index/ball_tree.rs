//! Exact Euclidean ball-tree index.
//!
//! Direct structural translation of the ball-tree this was grounded on:
//! each node is a hypersphere (center + radius) over a subset of points;
//! leaves (`indices.len() <= leaf_size`) hold points directly; internal
//! nodes split on the dimension of highest variance at the median,
//! clamping the split so neither side is empty. A node with zero variance
//! in every dimension (all its points coincide) becomes a degenerate leaf
//! early rather than splitting forever. Search recurses into the closer
//! child first and prunes a branch whenever `dist_to_center - radius`
//! already exceeds the current k-th best distance.

use rayon::prelude::*;

use super::SearchHit;
use crate::model::ChunkId;

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

fn mean(points: &[&Vec<f32>], dim: usize) -> Vec<f32> {
    let mut center = vec![0.0f32; dim];
    for point in points {
        for (c, v) in center.iter_mut().zip(point.iter()) {
            *c += v;
        }
    }
    let n = points.len().max(1) as f32;
    for c in &mut center {
        *c /= n;
    }
    center
}

struct BallNode {
    indices: Vec<usize>,
    center: Vec<f32>,
    radius: f32,
    left: Option<Box<BallNode>>,
    right: Option<Box<BallNode>>,
}

impl BallNode {
    fn build(points: &[Vec<f32>], indices: Vec<usize>, dim: usize, leaf_size: usize) -> BallNode {
        if indices.len() <= leaf_size {
            return Self::leaf(points, indices, dim);
        }

        let refs: Vec<&Vec<f32>> = indices.iter().map(|&i| &points[i]).collect();
        let center = mean(&refs, dim);

        let variances: Vec<f32> = (0..dim)
            .into_par_iter()
            .map(|d| {
                let mean_d = center[d];
                refs.iter().map(|p| (p[d] - mean_d).powi(2)).sum::<f32>() / refs.len().max(1) as f32
            })
            .collect();

        let split_dim = variances
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);

        let split_dim = match split_dim {
            Some(d) if variances[d] > 0.0 => d,
            _ => {
                // every point in this node coincides; stop splitting.
                return Self::leaf(points, indices, dim);
            }
        };

        let mut sorted = indices;
        sorted.sort_by(|&a, &b| points[a][split_dim].total_cmp(&points[b][split_dim]));

        let mut median = sorted.len() / 2;
        if median == 0 {
            median = 1;
        } else if median == sorted.len() {
            median = sorted.len() - 1;
        }

        let right_half = sorted.split_off(median);
        let left_indices = sorted;
        let right_indices = right_half;

        let left = BallNode::build(points, left_indices, dim, leaf_size);
        let right = BallNode::build(points, right_indices, dim, leaf_size);

        let radius = refs
            .iter()
            .map(|p| euclidean(p, &center))
            .fold(0.0f32, f32::max);

        BallNode {
            indices: Vec::new(),
            center,
            radius,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    fn leaf(points: &[Vec<f32>], indices: Vec<usize>, dim: usize) -> BallNode {
        if indices.is_empty() {
            return BallNode {
                indices,
                center: vec![0.0; dim],
                radius: 0.0,
                left: None,
                right: None,
            };
        }
        let refs: Vec<&Vec<f32>> = indices.iter().map(|&i| &points[i]).collect();
        let center = mean(&refs, dim);
        let radius = refs
            .iter()
            .map(|p| euclidean(p, &center))
            .fold(0.0f32, f32::max);
        BallNode {
            indices,
            center,
            radius,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// (distance, point index) pairs, kept sorted ascending and capped at k.
struct BestK {
    k: usize,
    results: Vec<(f32, usize)>,
}

impl BestK {
    fn new(k: usize) -> Self {
        Self {
            k,
            results: Vec::with_capacity(k),
        }
    }

    fn worst(&self) -> f32 {
        if self.results.len() >= self.k {
            self.results.last().map(|(d, _)| *d).unwrap_or(f32::INFINITY)
        } else {
            f32::INFINITY
        }
    }

    fn offer(&mut self, dist: f32, idx: usize) {
        if self.results.len() < self.k {
            self.results.push((dist, idx));
            self.results.sort_by(|a, b| a.0.total_cmp(&b.0));
        } else if dist < self.results.last().unwrap().0 {
            self.results.pop();
            self.results.push((dist, idx));
            self.results.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
    }
}

fn search_node(node: &BallNode, points: &[Vec<f32>], query: &[f32], best: &mut BestK) {
    let dist_to_center = euclidean(query, &node.center);

    if node.is_leaf() {
        for &idx in &node.indices {
            let dist = euclidean(query, &points[idx]);
            best.offer(dist, idx);
        }
        return;
    }

    let farthest = best.worst();
    if best.results.len() >= best.k && dist_to_center - node.radius > farthest {
        return;
    }

    let left = node.left.as_deref();
    let right = node.right.as_deref();
    let left_dist = left.map(|n| euclidean(query, &n.center)).unwrap_or(f32::INFINITY);
    let right_dist = right.map(|n| euclidean(query, &n.center)).unwrap_or(f32::INFINITY);

    let (first, first_dist, second, second_dist) = if left_dist <= right_dist {
        (left, left_dist, right, right_dist)
    } else {
        (right, right_dist, left, left_dist)
    };

    if let Some(node) = first {
        search_node(node, points, query, best);
    }

    let farthest = best.worst();
    let _ = first_dist;
    if let Some(node) = second {
        if best.results.len() < best.k || second_dist - node.radius <= farthest {
            search_node(node, points, query, best);
        }
    }
}

pub struct BallTreeIndex {
    points: Vec<Vec<f32>>,
    chunk_ids: Vec<ChunkId>,
    root: Option<BallNode>,
    pub leaf_size: usize,
}

impl BallTreeIndex {
    pub fn build(vectors: Vec<(ChunkId, Vec<f32>)>, leaf_size: usize) -> Self {
        if vectors.is_empty() {
            return Self {
                points: Vec::new(),
                chunk_ids: Vec::new(),
                root: None,
                leaf_size,
            };
        }

        let dim = vectors[0].1.len();
        let mut chunk_ids = Vec::with_capacity(vectors.len());
        let mut points = Vec::with_capacity(vectors.len());
        for (id, vector) in vectors {
            chunk_ids.push(id);
            points.push(vector);
        }

        let indices: Vec<usize> = (0..points.len()).collect();
        let root = BallNode::build(&points, indices, dim, leaf_size.max(1));

        Self {
            points,
            chunk_ids,
            root: Some(root),
            leaf_size,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let k = k.min(self.points.len());
        let Some(root) = self.root.as_ref() else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut best = BestK::new(k);
        search_node(root, &self.points, query, &mut best);

        best.results
            .into_iter()
            .map(|(dist, idx)| SearchHit {
                chunk_id: self.chunk_ids[idx],
                score: 1.0 / (1.0 + dist),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn finds_nearest_point() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let index = BallTreeIndex::build(
            vec![
                (a, vec![0.0, 0.0]),
                (b, vec![10.0, 10.0]),
                (c, vec![0.1, 0.1]),
            ],
            2,
        );

        let hits = index.search(&[0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, a);
    }

    #[test]
    fn matches_brute_force_on_random_data() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let dim = 6;
        let points: Vec<(ChunkId, Vec<f32>)> = (0..80)
            .map(|_| {
                let vector: Vec<f32> = (0..dim).map(|_| rng.gen_range(-10.0..10.0)).collect();
                (Uuid::new_v4(), vector)
            })
            .collect();

        let query: Vec<f32> = (0..dim).map(|_| rng.gen_range(-10.0..10.0)).collect();

        let mut brute: Vec<(f32, ChunkId)> = points
            .iter()
            .map(|(id, v)| (euclidean(&query, v), *id))
            .collect();
        brute.sort_by(|a, b| a.0.total_cmp(&b.0));
        let expected: Vec<ChunkId> = brute.iter().take(5).map(|(_, id)| *id).collect();

        let index = BallTreeIndex::build(points, 8);
        let hits = index.search(&query, 5);
        let actual: Vec<ChunkId> = hits.iter().map(|h| h.chunk_id).collect();

        assert_eq!(expected, actual);
    }

    #[test]
    fn degenerate_identical_points_do_not_infinite_loop() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let index = BallTreeIndex::build(
            vec![(a, vec![1.0, 1.0]), (b, vec![1.0, 1.0])],
            1,
        );
        let hits = index.search(&[1.0, 1.0], 2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn k_larger_than_points_is_clamped() {
        let a = Uuid::new_v4();
        let index = BallTreeIndex::build(vec![(a, vec![1.0, 2.0])], 40);
        let hits = index.search(&[0.0, 0.0], 50);
        assert_eq!(hits.len(), 1);
    }
}
