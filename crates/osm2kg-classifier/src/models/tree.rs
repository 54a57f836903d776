//! CART decision trees
//!
//! Trees are grown until every leaf is pure or cannot be split further. The
//! same grower backs the random forest, which additionally restricts the
//! features considered per split.

use ndarray::{Array2, ArrayView1, ArrayView2};
use osm2kg_core::{Label, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{
    check_width, invalid_param, not_fitted, unknown_param, BinaryTargets, Classifier, ParamValue,
};

/// Minimal gap between two feature values for a threshold to be placed between them
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Split quality measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Gini,
    Entropy,
}

impl Criterion {
    pub fn from_param(name: &str, value: &ParamValue) -> Result<Self> {
        match value.as_text(name)? {
            "gini" => Ok(Self::Gini),
            "entropy" => Ok(Self::Entropy),
            _ => Err(invalid_param(name, value)),
        }
    }

    fn impurity(&self, counts: [f64; 2]) -> f64 {
        let total = counts[0] + counts[1];
        if total == 0.0 {
            return 0.0;
        }
        match self {
            Self::Gini => 1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>(),
            Self::Entropy => -counts
                .iter()
                .filter(|c| **c > 0.0)
                .map(|c| {
                    let p = c / total;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

// ============================================================================
// Tree structure
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        proba: [f64; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A grown tree stored as a node arena, root at index 0
#[derive(Debug, Clone, Default)]
pub(crate) struct TreeModel {
    nodes: Vec<Node>,
    n_features: usize,
}

impl TreeModel {
    /// Grow a tree over the given sample indices (duplicates allowed)
    pub fn grow<R: Rng>(
        x: ArrayView2<'_, f64>,
        targets: &[usize],
        samples: Vec<usize>,
        criterion: Criterion,
        max_features: Option<usize>,
        rng: &mut R,
    ) -> Self {
        let mut grower = Grower {
            x: x.view(),
            targets,
            criterion,
            max_features,
            rng,
        };
        grower.build(samples)
    }

    /// Class probabilities of the leaf a sample falls into
    pub fn leaf_proba(&self, row: ArrayView1<'_, f64>) -> [f64; 2] {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

struct Grower<'a, R> {
    x: ArrayView2<'a, f64>,
    targets: &'a [usize],
    criterion: Criterion,
    max_features: Option<usize>,
    rng: &'a mut R,
}

impl<R: Rng> Grower<'_, R> {
    fn counts(&self, samples: &[usize]) -> [f64; 2] {
        let mut counts = [0.0; 2];
        for s in samples {
            counts[self.targets[*s]] += 1.0;
        }
        counts
    }

    fn build(&mut self, mut samples: Vec<usize>) -> TreeModel {
        let mut nodes = vec![Node::Leaf { proba: [0.0; 2] }];
        let mut stack = vec![(0usize, 0usize, samples.len())];

        while let Some((node, start, end)) = stack.pop() {
            let counts = self.counts(&samples[start..end]);
            let total = counts[0] + counts[1];
            let leaf = Node::Leaf {
                proba: [counts[0] / total, counts[1] / total],
            };

            if counts[0] == 0.0 || counts[1] == 0.0 || end - start < 2 {
                nodes[node] = leaf;
                continue;
            }

            let Some((feature, threshold)) = self.best_split(&samples[start..end], counts) else {
                nodes[node] = leaf;
                continue;
            };

            let slice = &mut samples[start..end];
            let mut boundary = 0;
            for j in 0..slice.len() {
                if self.x[[slice[j], feature]] <= threshold {
                    slice.swap(boundary, j);
                    boundary += 1;
                }
            }
            if boundary == 0 || boundary == slice.len() {
                nodes[node] = leaf;
                continue;
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { proba: [0.0; 2] });
            nodes.push(Node::Leaf { proba: [0.0; 2] });
            nodes[node] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            stack.push((right, start + boundary, end));
            stack.push((left, start, start + boundary));
        }

        TreeModel {
            nodes,
            n_features: self.x.ncols(),
        }
    }

    /// Lowest weighted child impurity over all candidate thresholds
    fn best_split(&mut self, samples: &[usize], parent: [f64; 2]) -> Option<(usize, f64)> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if self.max_features.is_some() {
            features.shuffle(&mut *self.rng);
        }

        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = samples.to_vec();

        for (visited, &feature) in features.iter().enumerate() {
            // keep looking past max_features until a valid split exists
            if let Some(limit) = self.max_features {
                if visited >= limit && best.is_some() {
                    break;
                }
            }

            let column = self.x.column(feature);
            sorted.sort_by(|a, b| column[*a].total_cmp(&column[*b]));

            let mut left = [0.0; 2];
            for pos in 0..sorted.len() - 1 {
                left[self.targets[sorted[pos]]] += 1.0;
                let value = column[sorted[pos]];
                let next = column[sorted[pos + 1]];
                if next <= value + FEATURE_THRESHOLD {
                    continue;
                }

                let right = [parent[0] - left[0], parent[1] - left[1]];
                let n_left = (pos + 1) as f64;
                let n_right = sorted.len() as f64 - n_left;
                let score = n_left * self.criterion.impurity(left)
                    + n_right * self.criterion.impurity(right);

                if best.map_or(true, |(_, _, s)| score < s) {
                    let mut threshold = (value + next) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some((feature, threshold, score));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

// ============================================================================
// Decision Tree Classifier
// ============================================================================

/// Single CART tree
#[derive(Debug, Clone)]
pub struct DecisionTree {
    criterion: Criterion,
    classes: Vec<Label>,
    tree: Option<TreeModel>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            classes: Vec::new(),
            tree: None,
        }
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_leaves(&self) -> usize {
        self.tree.as_ref().map_or(0, TreeModel::n_leaves)
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &'static str {
        "DecisionTreeClassifier"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "criterion" => self.criterion = Criterion::from_param(name, value)?,
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        // feature order is fixed without max_features, the generator stays unused
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let samples = (0..x.nrows()).collect();
        self.tree = Some(TreeModel::grow(
            x,
            &encoded.targets,
            samples,
            self.criterion,
            None,
            &mut rng,
        ));
        self.classes = encoded.classes;
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let tree = self.tree.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        check_width(self.name(), tree.n_features(), &x)?;

        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.outer_iter().enumerate() {
            let leaf = tree.leaf_proba(row);
            proba[[i, 0]] = leaf[0];
            proba[[i, 1]] = leaf[1];
        }
        Ok(proba)
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
