//! CART-style regression tree, the shared building block for both
//! regressors trained per score component.
//!
//! No random-forest or boosted-tree crate exists anywhere in this
//! dependency stack, so both ensembles are built directly on top of this
//! recursive variance-reduction splitter, the same hand-rolled-model
//! posture the risk engine elsewhere in this codebase takes for its own
//! quantitative formulas.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature_index: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    /// Fit a tree over `x` (row-major feature matrix) and `y` (targets).
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: TreeParams) -> Self {
        let indices: Vec<usize> = (0..y.len()).collect();
        let root = build_node(x, y, &indices, 0, params);
        RegressionTree { root }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        predict_node(&self.root, row)
    }
}

fn mean(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn variance(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let m = mean(y, indices);
    indices.iter().map(|&i| (y[i] - m).powi(2)).sum::<f64>() / indices.len() as f64
}

fn build_node(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    params: TreeParams,
) -> Node {
    let leaf_value = mean(y, indices);
    if depth >= params.max_depth || indices.len() < params.min_samples_split {
        return Node::Leaf { value: leaf_value };
    }

    let parent_variance = variance(y, indices);
    if parent_variance <= 1e-12 {
        return Node::Leaf { value: leaf_value };
    }

    let num_features = x.first().map(|row| row.len()).unwrap_or(0);
    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, weighted child variance)

    for feature_index in 0..num_features {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[i][feature_index]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        for window in values.windows(2) {
            let threshold = (window[0] + window[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i][feature_index] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let weighted = (left.len() as f64 * variance(y, &left)
                + right.len() as f64 * variance(y, &right))
                / indices.len() as f64;
            if best.map(|(_, _, best_w)| weighted < best_w).unwrap_or(true) {
                best = Some((feature_index, threshold, weighted));
            }
        }
    }

    match best {
        Some((feature_index, threshold, weighted)) if weighted < parent_variance => {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i][feature_index] <= threshold);
            Node::Split {
                feature_index,
                threshold,
                left: Box::new(build_node(x, y, &left, depth + 1, params)),
                right: Box::new(build_node(x, y, &right, depth + 1, params)),
            }
        }
        _ => Node::Leaf { value: leaf_value },
    }
}

fn predict_node(node: &Node, row: &[f64]) -> f64 {
    match node {
        Node::Leaf { value } => *value,
        Node::Split {
            feature_index,
            threshold,
            left,
            right,
        } => {
            if row[*feature_index] <= *threshold {
                predict_node(left, row)
            } else {
                predict_node(right, row)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_a_simple_linear_relationship() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64 * 2.0).collect();
        let tree = RegressionTree::fit(
            &x,
            &y,
            TreeParams {
                max_depth: 6,
                min_samples_split: 2,
            },
        );
        let pred = tree.predict(&[10.0]);
        assert!((pred - 20.0).abs() < 3.0, "got {pred}");
    }

    #[test]
    fn single_sample_yields_constant_leaf() {
        let tree = RegressionTree::fit(
            &[vec![1.0]],
            &[42.0],
            TreeParams {
                max_depth: 10,
                min_samples_split: 5,
            },
        );
        assert_eq!(tree.predict(&[0.0]), 42.0);
        assert_eq!(tree.predict(&[100.0]), 42.0);
    }
}
