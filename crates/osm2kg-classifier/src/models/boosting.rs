//! Gradient-boosted trees
//!
//! Second-order boosting on the logistic loss: every round fits a depth-limited
//! regression tree to the gradients and hessians of the current margins, with
//! L2-regularized leaf weights scaled by the learning rate.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use osm2kg_core::{Label, Result};

use super::{
    check_width, not_fitted, proba_from_positive, sigmoid, unknown_param, BinaryTargets,
    Classifier, ParamValue,
};

const N_ROUNDS: usize = 100;
const MAX_DEPTH: usize = 3;
const LEARNING_RATE: f64 = 0.1;
const LAMBDA: f64 = 1.0;
const MIN_CHILD_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone)]
enum RegressionNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<RegressionNode>,
}

impl RegressionTree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                RegressionNode::Leaf(weight) => return *weight,
                RegressionNode::Split {
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
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one boosting round's tree from per-sample gradient statistics
struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<RegressionNode>,
}

impl<'a> TreeBuilder<'a> {
    fn build(x: ArrayView2<'a, f64>, grad: &'a [f64], hess: &'a [f64]) -> RegressionTree {
        let mut builder = Self {
            x,
            grad,
            hess,
            nodes: Vec::new(),
        };
        let samples: Vec<usize> = (0..x.nrows()).collect();
        builder.grow(samples, 0);
        RegressionTree {
            nodes: builder.nodes,
        }
    }

    fn sums(&self, samples: &[usize]) -> (f64, f64) {
        samples
            .iter()
            .fold((0.0, 0.0), |(g, h), s| (g + self.grad[*s], h + self.hess[*s]))
    }

    /// Appends the subtree for `samples` and returns its root index
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        let (g, h) = self.sums(&samples);
        self.nodes
            .push(RegressionNode::Leaf(-g / (h + LAMBDA) * LEARNING_RATE));

        if depth >= MAX_DEPTH {
            return index;
        }
        let Some(split) = self.best_split(&samples, g, h) else {
            return index;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|s| self.x[[*s, split.feature]] <= split.threshold);

        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[index] = RegressionNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&self, samples: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent_score = g * g / (h + LAMBDA);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = samples.to_vec();

        for feature in 0..self.x.ncols() {
            let column = self.x.column(feature);
            sorted.sort_by(|a, b| column[*a].total_cmp(&column[*b]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..sorted.len().saturating_sub(1) {
                gl += self.grad[sorted[pos]];
                hl += self.hess[sorted[pos]];
                let value = column[sorted[pos]];
                let next = column[sorted[pos + 1]];
                if next <= value {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < MIN_CHILD_WEIGHT || hr < MIN_CHILD_WEIGHT {
                    continue;
                }

                let gain =
                    0.5 * (gl * gl / (hl + LAMBDA) + gr * gr / (hr + LAMBDA) - parent_score);
                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Boosted tree ensemble with logistic output
#[derive(Debug, Clone, Default)]
pub struct GradientBoosting {
    classes: Vec<Label>,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn new() -> Self {
        Self::default()
    }

    fn margins(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
            .collect()
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "XGBClassifier"
    }

    fn set_param(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(unknown_param(self.name(), name))
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        let targets = encoded.as_f64();
        let mut margins = vec![0.0; x.nrows()];
        let mut trees = Vec::with_capacity(N_ROUNDS);

        for _ in 0..N_ROUNDS {
            let probs: Vec<f64> = margins.iter().map(|m| sigmoid(*m)).collect();
            let grad: Vec<f64> = probs.iter().zip(&targets).map(|(p, t)| p - t).collect();
            let hess: Vec<f64> = probs.iter().map(|p| (p * (1.0 - p)).max(1e-16)).collect();

            let tree = TreeBuilder::build(x.view(), &grad, &hess);
            for (margin, row) in margins.iter_mut().zip(x.outer_iter()) {
                *margin += tree.predict(row);
            }
            trees.push(tree);
        }

        self.classes = encoded.classes;
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.name()));
        }
        check_width(self.name(), self.n_features, &x)?;
        Ok(proba_from_positive(self.margins(&x).iter().map(|m| sigmoid(*m))))
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
