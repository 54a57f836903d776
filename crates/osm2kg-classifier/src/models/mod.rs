//! Classifier families
//!
//! Every family implements the [`Classifier`] trait: hyperparameters are set
//! by name, `fit` learns from a feature matrix and its labels, and
//! `predict_proba` returns one column per class in the order reported by
//! [`Classifier::classes`].
//!
//! The [`create_model`] factory maps a configured [`ModelKind`] to a fresh
//! classifier and the hyperparameter grid the search samples from.

pub mod boosting;
pub mod forest;
pub mod knn;
pub mod logistic;
pub mod mlp;
pub mod naive_bayes;
pub mod svm;
pub mod tree;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use knn::KNearestNeighbors;
pub use logistic::LogisticRegression;
pub use mlp::NeuralNetwork;
pub use naive_bayes::GaussianNaiveBayes;
pub use svm::{Kernel, SupportVectorMachine};
pub use tree::{Criterion, DecisionTree};

use ndarray::{Array2, ArrayView2, Axis};
use osm2kg_core::{Label, ModelKind, Osm2kgError, Result};
use rand::seq::index;
use rand::Rng;

// ============================================================================
// Classifier Trait
// ============================================================================

/// A binary link classifier
pub trait Classifier: Send + Sync {
    /// Class name recorded next to the scores
    fn name(&self) -> &'static str;

    /// Set a hyperparameter by name
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Learn from the rows of `x` and their labels
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()>;

    /// Classes in the column order of [`Classifier::predict_proba`]
    ///
    /// Empty until the model is fitted.
    fn classes(&self) -> &[Label];

    /// Class membership probabilities, one row per sample
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Most probable class per sample
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let proba = self.predict_proba(x)?;
        let classes = self.classes();
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0;
                for (i, p) in row.iter().enumerate() {
                    if *p > row[best] {
                        best = i;
                    }
                }
                classes[best]
            })
            .collect())
    }

    /// Clone into a fresh boxed trait object (fitted state included)
    fn clone_box(&self) -> Box<dyn Classifier>;
}

impl Clone for Box<dyn Classifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// ============================================================================
// Hyperparameters
// ============================================================================

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Text(&'static str),
}

impl ParamValue {
    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            Self::Text(_) => Err(invalid_param(name, self)),
        }
    }

    /// Interpret as a count that must be at least one
    pub fn as_count(&self, name: &str) -> Result<usize> {
        match self {
            Self::Int(v) if *v >= 1 => Ok(*v as usize),
            _ => Err(invalid_param(name, self)),
        }
    }

    pub fn as_text(&self, name: &str) -> Result<&'static str> {
        match self {
            Self::Text(v) => Ok(v),
            _ => Err(invalid_param(name, self)),
        }
    }

    /// Interpret as a strictly positive float
    pub fn as_positive(&self, name: &str) -> Result<f64> {
        let v = self.as_f64(name)?;
        if v > 0.0 && v.is_finite() {
            Ok(v)
        } else {
            Err(invalid_param(name, self))
        }
    }

    /// Interpret as a non-negative float
    pub fn as_non_negative(&self, name: &str) -> Result<f64> {
        let v = self.as_f64(name)?;
        if v >= 0.0 && v.is_finite() {
            Ok(v)
        } else {
            Err(invalid_param(name, self))
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

pub(crate) fn invalid_param(name: &str, value: &ParamValue) -> Osm2kgError {
    Osm2kgError::Config(format!("invalid value {value} for hyperparameter '{name}'"))
}

pub(crate) fn unknown_param(model: &str, name: &str) -> Osm2kgError {
    Osm2kgError::Config(format!("{model} has no hyperparameter '{name}'"))
}

/// One assignment of values to hyperparameter names
pub type ParamSet = Vec<(&'static str, ParamValue)>;

/// Discrete hyperparameter grid
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    params: Vec<(&'static str, Vec<ParamValue>)>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, values: Vec<ParamValue>) -> Self {
        self.params.push((name, values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of distinct parameter combinations
    pub fn grid_size(&self) -> usize {
        self.params.iter().map(|(_, values)| values.len()).product()
    }

    /// The combination at a position of the grid, last parameter varying fastest
    pub fn candidate(&self, mut position: usize) -> ParamSet {
        let mut set = Vec::with_capacity(self.params.len());
        for (name, values) in self.params.iter().rev() {
            set.push((*name, values[position % values.len()].clone()));
            position /= values.len();
        }
        set.reverse();
        set
    }

    /// Draw up to `n_iter` distinct combinations
    ///
    /// The whole grid is returned in order when it is not larger than `n_iter`.
    /// An empty space yields a single empty combination (model defaults).
    pub fn sample<R: Rng + ?Sized>(&self, n_iter: usize, rng: &mut R) -> Vec<ParamSet> {
        let size = self.grid_size();
        if size <= n_iter {
            return (0..size).map(|p| self.candidate(p)).collect();
        }
        index::sample(rng, size, n_iter)
            .into_iter()
            .map(|p| self.candidate(p))
            .collect()
    }
}

fn c_grid() -> Vec<ParamValue> {
    (0..500).map(|x| ParamValue::Float(x as f64 / 100.0)).collect()
}

fn tol_grid() -> Vec<ParamValue> {
    (0..100).map(|x| ParamValue::Float(x as f64 / 10000.0)).collect()
}

fn criterion_grid() -> Vec<ParamValue> {
    vec![ParamValue::Text("gini"), ParamValue::Text("entropy")]
}

// ============================================================================
// Model Factory
// ============================================================================

/// A fresh classifier together with the grid its hyperparameters are searched over
pub struct ModelSpec {
    pub kind: ModelKind,
    pub model: Box<dyn Classifier>,
    pub space: SearchSpace,
}

/// Instantiate the classifier configured for a run
pub fn create_model(kind: ModelKind, seed: u64) -> ModelSpec {
    let (model, space): (Box<dyn Classifier>, SearchSpace) = match kind {
        ModelKind::LinearSvm => (
            Box::new(SupportVectorMachine::new(Kernel::Linear)),
            SearchSpace::new().with("C", c_grid()).with("tol", tol_grid()),
        ),
        ModelKind::DecisionTree => (
            Box::new(DecisionTree::new()),
            SearchSpace::new().with("criterion", criterion_grid()),
        ),
        ModelKind::RandomForest => (
            Box::new(RandomForest::new(seed)),
            SearchSpace::new()
                .with("criterion", criterion_grid())
                .with("n_estimators", (5..21).map(ParamValue::Int).collect()),
        ),
        ModelKind::KNearestNeighbors => (
            Box::new(KNearestNeighbors::new()),
            SearchSpace::new()
                .with("n_neighbors", (1..11).map(ParamValue::Int).collect())
                .with(
                    "weights",
                    vec![ParamValue::Text("uniform"), ParamValue::Text("distance")],
                )
                .with("leaf_size", (10..50).map(ParamValue::Int).collect()),
        ),
        ModelKind::LogisticRegression => (
            Box::new(LogisticRegression::new()),
            SearchSpace::new().with("C", c_grid()).with("tol", tol_grid()),
        ),
        ModelKind::KernelSvm => (
            Box::new(SupportVectorMachine::new(Kernel::Rbf)),
            SearchSpace::new().with("C", c_grid()).with("tol", tol_grid()),
        ),
        ModelKind::NaiveBayes => (Box::new(GaussianNaiveBayes::new()), SearchSpace::new()),
        ModelKind::NeuralNetwork => (Box::new(NeuralNetwork::new(seed)), SearchSpace::new()),
        ModelKind::GradientBoosting => (Box::new(GradientBoosting::new()), SearchSpace::new()),
    };

    ModelSpec { kind, model, space }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Labels encoded as positions in the sorted class list
#[derive(Debug, Clone)]
pub(crate) struct BinaryTargets {
    pub classes: Vec<Label>,
    /// 0 or 1 per sample, indexing `classes`
    pub targets: Vec<usize>,
}

impl BinaryTargets {
    pub fn encode(y: &[Label], n_rows: usize) -> Result<Self> {
        if y.len() != n_rows {
            return Err(Osm2kgError::InvalidData(format!(
                "{} labels for {} feature rows",
                y.len(),
                n_rows
            )));
        }

        let mut classes: Vec<Label> = y.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() != 2 {
            return Err(Osm2kgError::InvalidData(format!(
                "training data must contain both labels, found {:?}",
                classes
            )));
        }

        let targets = y.iter().map(|label| usize::from(*label == classes[1])).collect();
        Ok(Self { classes, targets })
    }

    /// Targets as 0.0 / 1.0 for the second class
    pub fn as_f64(&self) -> Vec<f64> {
        self.targets.iter().map(|t| *t as f64).collect()
    }
}

/// Two-column probability matrix from the probability of the second class
pub(crate) fn proba_from_positive(positive: impl IntoIterator<Item = f64>) -> Array2<f64> {
    let positive: Vec<f64> = positive.into_iter().collect();
    Array2::from_shape_fn((positive.len(), 2), |(i, j)| {
        if j == 1 {
            positive[i]
        } else {
            1.0 - positive[i]
        }
    })
}

pub(crate) fn not_fitted(model: &str) -> Osm2kgError {
    Osm2kgError::Training(format!("{model} used before fit"))
}

pub(crate) fn check_width(model: &str, expected: usize, x: &ArrayView2<'_, f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(Osm2kgError::InvalidData(format!(
            "{model} was fitted on {expected} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::Array2;
    use osm2kg_core::Label;

    /// Two well separated clusters: correct around (-2, -2), incorrect around (2, 2)
    pub fn separable(n_per_class: usize) -> (Array2<f64>, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i as f64 * 0.37).sin() * 0.5;
            rows.extend_from_slice(&[-2.0 + jitter, -2.0 - jitter]);
            labels.push(Label::Correct);
            rows.extend_from_slice(&[2.0 - jitter, 2.0 + jitter]);
            labels.push(Label::Incorrect);
        }
        let x = Array2::from_shape_vec((2 * n_per_class, 2), rows).unwrap();
        (x, labels)
    }

    pub fn accuracy(truth: &[Label], predicted: &[Label]) -> f64 {
        let hits = truth.iter().zip(predicted).filter(|(a, b)| a == b).count();
        hits as f64 / truth.len() as f64
    }
}
