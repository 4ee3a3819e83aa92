//! Partitioning tree
//!
//! One randomized binary tree built on a subsample. Each internal node splits
//! on a random non-constant feature at a random value in `[min, max)`; points
//! `< split` go left, `>= split` go right, both at build and at scoring time.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::average_path_length;

/// A single isolation tree, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitioningTree {
    root: Node,
}

/// Node in a partitioning tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    /// Internal node with an axis-aligned split
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Leaf holding the number of subsample points that reached it
    Leaf { size: usize },
}

/// Height limit `⌈log2 ψ⌉` for a subsample of `psi` points
pub fn max_depth_for(psi: usize) -> usize {
    if psi <= 1 {
        return 0;
    }
    (usize::BITS - (psi - 1).leading_zeros()) as usize
}

impl PartitioningTree {
    /// Build a tree from the sampled rows. All rows must share one width.
    pub fn build<R: Rng + ?Sized>(sample: Vec<&[f64]>, max_depth: usize, rng: &mut R) -> Self {
        let root = Self::build_node(sample, 0, max_depth, rng);
        Self { root }
    }

    fn build_node<R: Rng + ?Sized>(
        points: Vec<&[f64]>,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Node {
        // Terminal conditions
        if points.len() <= 1 || depth >= max_depth {
            return Node::Leaf { size: points.len() };
        }

        let candidates = splittable_features(&points);
        if candidates.is_empty() {
            // every feature constant over this subset
            return Node::Leaf { size: points.len() };
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let split = draw_split(min, max, rng);

        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            points.into_iter().partition(|p| p[feature] < split);

        Node::Internal {
            feature,
            split,
            left: Box::new(Self::build_node(left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(right, depth + 1, max_depth, rng)),
        }
    }

    /// Path length `h(x)`: internal nodes traversed plus `c(leaf_size)`.
    ///
    /// `x` must have the dimensionality the tree was built with.
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *split { left } else { right };
                    depth += 1;
                }
            }
        }
    }

    /// Deepest leaf depth
    pub fn height(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Internal { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    /// Total points held by the leaves (equals the subsample size)
    pub fn leaf_total(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { size } => *size,
                Node::Internal { left, right, .. } => walk(left) + walk(right),
            }
        }
        walk(&self.root)
    }
}

/// Features whose range over `points` is non-degenerate, with their (min, max)
fn splittable_features(points: &[&[f64]]) -> Vec<(usize, f64, f64)> {
    let n_features = points.first().map(|p| p.len()).unwrap_or(0);

    (0..n_features)
        .filter_map(|feature| {
            let (min, max) = points.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), p| (min.min(p[feature]), max.max(p[feature])),
            );
            (min < max).then_some((feature, min, max))
        })
        .collect()
}

/// Uniform split value in `[min, max)`
fn draw_split<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    if (max - min).is_finite() {
        return rng.gen_range(min..max);
    }
    // span overflows f64; interpolate without forming max - min
    let t: f64 = rng.gen();
    (min * (1.0 - t) + max * t).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn test_max_depth_for() {
        assert_eq!(max_depth_for(0), 0);
        assert_eq!(max_depth_for(1), 0);
        assert_eq!(max_depth_for(2), 1);
        assert_eq!(max_depth_for(3), 2);
        assert_eq!(max_depth_for(4), 2);
        assert_eq!(max_depth_for(5), 3);
        assert_eq!(max_depth_for(256), 8);
    }

    #[test]
    fn test_single_point_is_leaf() {
        let data = vec![vec![1.0, 2.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = PartitioningTree::build(rows(&data), 4, &mut rng);

        assert_eq!(tree.height(), 0);
        assert_eq!(tree.path_length(&[100.0, -100.0]), 0.0);
    }

    #[test]
    fn test_constant_features_stop_splitting() {
        let data = vec![vec![3.0, 3.0]; 8];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = PartitioningTree::build(rows(&data), 3, &mut rng);

        assert_eq!(tree.height(), 0);
        // leaf keeps all 8 points, so h(x) = c(8)
        assert!((tree.path_length(&[3.0, 3.0]) - average_path_length(8)).abs() < 1e-12);
    }

    #[test]
    fn test_depth_limit_and_leaf_sizes() {
        let data: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64, (i * 7 % 16) as f64]).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let tree = PartitioningTree::build(rows(&data), max_depth_for(16), &mut rng);

        assert!(tree.height() <= 4);
        assert_eq!(tree.leaf_total(), 16);
    }

    #[test]
    fn test_split_only_on_varying_feature() {
        // feature 0 is constant; every split must use feature 1
        let data: Vec<Vec<f64>> = (0..8).map(|i| vec![5.0, i as f64]).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let tree = PartitioningTree::build(rows(&data), 3, &mut rng);

        fn uses_only_feature_one(node: &Node) -> bool {
            match node {
                Node::Leaf { .. } => true,
                Node::Internal { feature, left, right, .. } => {
                    *feature == 1 && uses_only_feature_one(left) && uses_only_feature_one(right)
                }
            }
        }
        assert!(tree.height() > 0);
        assert!(uses_only_feature_one(&tree.root));
    }

    #[test]
    fn test_split_boundary_goes_right() {
        let tree = PartitioningTree {
            root: Node::Internal {
                feature: 0,
                split: 1.0,
                left: Box::new(Node::Leaf { size: 1 }),
                right: Box::new(Node::Internal {
                    feature: 0,
                    split: 2.0,
                    left: Box::new(Node::Leaf { size: 1 }),
                    right: Box::new(Node::Leaf { size: 1 }),
                }),
            },
        };

        assert_eq!(tree.path_length(&[0.5]), 1.0);
        // value equal to the split is not "less than" it
        assert_eq!(tree.path_length(&[1.0]), 2.0);
        assert_eq!(tree.path_length(&[2.0]), 2.0);
    }

    #[test]
    fn test_draw_split_huge_span() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let split = draw_split(-f64::MAX, f64::MAX, &mut rng);
            assert!(split.is_finite());
        }
    }
}
