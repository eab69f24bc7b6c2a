//! Second-order regression trees used as boosting weak learners.
//!
//! Each tree is grown greedily on per-row gradients and hessians of the
//! logistic loss:
//! - leaf weight: w* = -G / (H + lambda), soft-thresholded by alpha
//! - split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)]
//! - a split is kept only if its gain exceeds gamma and both children carry
//!   at least `min_child_weight` hessian.

use crate::dataset::FeatureMatrix;
use crate::params::HyperParams;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A node of a fitted tree. Rows with `value <= threshold` go left.
///
/// Children are indices into the owning [`Tree`]'s node list and always
/// point past their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree stored as a flat node list with the root at index 0.
///
/// Keeping the nodes flat means neither prediction nor (de)serialization
/// recurses, so depth is limited only by `max_depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    #[cfg(test)]
    pub(crate) fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    #[cfg(test)]
    pub(crate) fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Add this tree's split gains into `totals[feature]`.
    pub(crate) fn accumulate_gain(&self, totals: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                if let Some(t) = totals.get_mut(*feature) {
                    *t += gain;
                }
            }
        }
    }

    /// Largest feature index referenced by any split.
    pub(crate) fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    pub(crate) fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        deepest
    }

    /// Structural check for deserialized trees: a non-empty node list whose
    /// child links stay in bounds and point forward.
    pub(crate) fn check_links(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                for child in [*left, *right] {
                    if child <= i || child >= len {
                        return Err(format!("node {i} links to invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

enum Grown {
    Leaf(f64),
    Split {
        split: SplitCandidate,
        left_rows: Vec<usize>,
        right_rows: Vec<usize>,
    },
}

/// Grows one tree over a fixed gradient/hessian snapshot.
pub(crate) struct TreeBuilder<'a> {
    pub x: &'a FeatureMatrix,
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    /// Feature columns eligible for splitting in this tree.
    pub features: &'a [usize],
    pub params: &'a HyperParams,
}

impl TreeBuilder<'_> {
    /// Grow a tree over `rows`, expanding nodes from an explicit work list.
    pub(crate) fn build(&self, rows: &[usize]) -> Tree {
        let mut nodes = vec![Node::Leaf { weight: 0.0 }];
        let mut pending = vec![(0usize, rows.to_vec(), 0usize)];

        while let Some((slot, rows, depth)) = pending.pop() {
            nodes[slot] = match self.grow(&rows, depth) {
                Grown::Leaf(weight) => Node::Leaf { weight },
                Grown::Split {
                    split,
                    left_rows,
                    right_rows,
                } => {
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { weight: 0.0 });
                    nodes.push(Node::Leaf { weight: 0.0 });
                    pending.push((right, right_rows, depth + 1));
                    pending.push((left, left_rows, depth + 1));
                    Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        gain: split.gain,
                        left,
                        right,
                    }
                }
            };
        }

        Tree { nodes }
    }

    /// Decide whether the node holding `rows` becomes a leaf or splits.
    fn grow(&self, rows: &[usize], depth: usize) -> Grown {
        let g_sum: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h_sum: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let weight = leaf_weight(g_sum, h_sum, self.params.reg_lambda, self.params.reg_alpha);

        if depth >= self.params.max_depth
            || rows.len() < 2
            || h_sum < self.params.min_child_weight
        {
            return Grown::Leaf(weight);
        }

        // Candidates are evaluated in parallel but reduced in feature order,
        // so equal gains always resolve to the lowest feature index.
        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split_for_feature(rows, f, g_sum, h_sum))
            .collect();
        let best = candidates
            .into_iter()
            .flatten()
            .fold(None::<SplitCandidate>, |best, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            });

        match best {
            Some(split) if split.gain > self.params.gamma => {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .iter()
                    .partition(|&&i| self.x.get(i, split.feature) <= split.threshold);

                if left_rows.is_empty() || right_rows.is_empty() {
                    return Grown::Leaf(weight);
                }
                Grown::Split {
                    split,
                    left_rows,
                    right_rows,
                }
            }
            _ => Grown::Leaf(weight),
        }
    }

    /// Exact greedy scan over the sorted values of one feature.
    fn best_split_for_feature(
        &self,
        rows: &[usize],
        feature: usize,
        g_total: f64,
        h_total: f64,
    ) -> Option<SplitCandidate> {
        let mut sorted: Vec<usize> = rows.to_vec();
        sorted.sort_by(|&a, &b| self.x.get(a, feature).total_cmp(&self.x.get(b, feature)));

        let lambda = self.params.reg_lambda;
        let parent_score = g_total * g_total / (h_total + lambda);

        let mut g_left = 0.0;
        let mut h_left = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..sorted.len() - 1 {
            let idx = sorted[pos];
            g_left += self.grad[idx];
            h_left += self.hess[idx];

            let value = self.x.get(idx, feature);
            let next_value = self.x.get(sorted[pos + 1], feature);
            if next_value - value < 1e-12 {
                continue;
            }

            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                continue;
            }

            let gain = 0.5
                * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent_score);

            if best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next_value) / 2.0,
                    gain,
                });
            }
        }

        best
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization.
fn leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let denom = h_sum + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    let g = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g / denom
}
