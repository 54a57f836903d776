//! Model fitting and randomized hyperparameter search
//!
//! In debug mode the classifier is fitted once with its defaults. Otherwise
//! candidates are sampled from the model's grid, each is scored by stratified
//! cross validation on macro-F1 in a bounded worker pool, and the best one is
//! refitted on the full training set.

use ndarray::{ArrayView2, Axis};
use osm2kg_core::{Label, ModelKind, Osm2kgError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::metrics::f1_macro;
use crate::models::{Classifier, ModelSpec, ParamSet};

/// Cross-validation folds used when every class has enough samples
pub const DEFAULT_CV_FOLDS: usize = 5;

/// Search iterations for a model family
pub fn search_iterations(kind: ModelKind) -> usize {
    match kind {
        ModelKind::DecisionTree => 2,
        _ => 100,
    }
}

/// A fitted classifier and how it was selected
pub struct FitOutcome {
    pub model: Box<dyn Classifier>,
    /// Chosen hyperparameters (empty for a direct fit or an empty grid)
    pub params: ParamSet,
    /// Mean cross-validated macro-F1 of the chosen candidate
    pub cv_score: Option<f64>,
}

impl std::fmt::Debug for FitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitOutcome")
            .field("model", &self.model.name())
            .field("params", &self.params)
            .field("cv_score", &self.cv_score)
            .finish()
    }
}

/// Fits a model directly or through randomized search
#[derive(Debug, Clone)]
pub struct Optimizer {
    workers: usize,
    seed: u64,
    cv_folds: usize,
}

impl Optimizer {
    pub fn new(workers: usize, seed: u64) -> Self {
        Self {
            workers: workers.max(1),
            seed,
            cv_folds: DEFAULT_CV_FOLDS,
        }
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn fit(
        &self,
        spec: ModelSpec,
        x: ArrayView2<'_, f64>,
        y: &[Label],
        debug: bool,
    ) -> Result<FitOutcome> {
        if debug {
            let mut model = spec.model;
            tracing::info!(model = model.name(), "fitting with default hyperparameters");
            model.fit(x, y)?;
            return Ok(FitOutcome {
                model,
                params: Vec::new(),
                cv_score: None,
            });
        }
        self.search(spec, x, y)
    }

    fn search(&self, spec: ModelSpec, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<FitOutcome> {
        let folds = stratified_folds(y, self.cv_folds)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let candidates = spec.space.sample(search_iterations(spec.kind), &mut rng);

        tracing::info!(
            model = spec.model.name(),
            candidates = candidates.len(),
            folds = folds.len(),
            workers = self.workers,
            "running randomized hyperparameter search"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Osm2kgError::Training(format!("search worker pool: {e}")))?;

        let base = spec.model.as_ref();
        let scores: Vec<f64> = pool.install(|| {
            candidates
                .par_iter()
                .map(|params| cross_validate(base, params, x, y, &folds))
                .collect()
        });

        let mut best: Option<(usize, f64)> = None;
        for (index, score) in scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, s)| *score > s) {
                best = Some((index, *score));
            }
        }
        let (index, score) = best.ok_or_else(|| {
            Osm2kgError::Training(format!(
                "no valid {} hyperparameter candidate",
                spec.model.name()
            ))
        })?;

        let params = candidates[index].clone();
        tracing::info!(?params, cv_f1_macro = score, "best candidate selected");

        let mut model = configured(base, &params)?;
        model.fit(x, y)?;
        Ok(FitOutcome {
            model,
            params,
            cv_score: Some(score),
        })
    }
}

fn configured(base: &dyn Classifier, params: &ParamSet) -> Result<Box<dyn Classifier>> {
    let mut model = base.clone_box();
    for (name, value) in params {
        model.set_param(name, value)?;
    }
    Ok(model)
}

/// Mean macro-F1 over the folds, NaN when the candidate cannot be trained
fn cross_validate(
    base: &dyn Classifier,
    params: &ParamSet,
    x: ArrayView2<'_, f64>,
    y: &[Label],
    folds: &[Vec<usize>],
) -> f64 {
    let run = || -> Result<f64> {
        let mut total = 0.0;
        for held_out in folds {
            let train: Vec<usize> = (0..y.len())
                .filter(|i| held_out.binary_search(i).is_err())
                .collect();

            let mut model = configured(base, params)?;
            let y_train: Vec<Label> = train.iter().map(|i| y[*i]).collect();
            model.fit(x.select(Axis(0), &train).view(), &y_train)?;

            let predicted = model.predict(x.select(Axis(0), held_out).view())?;
            let truth: Vec<Label> = held_out.iter().map(|i| y[*i]).collect();
            total += f1_macro(&truth, &predicted);
        }
        Ok(total / folds.len() as f64)
    };

    run().unwrap_or_else(|e| {
        tracing::debug!(?params, error = %e, "candidate failed");
        f64::NAN
    })
}

/// Held-out indices of each fold, sorted
///
/// The i-th sample of every class goes to fold `i % n_folds`, so each fold
/// keeps the class proportions. The fold count shrinks to the size of the
/// smallest class.
pub fn stratified_folds(y: &[Label], n_folds: usize) -> Result<Vec<Vec<usize>>> {
    let smallest = Label::ALL
        .iter()
        .map(|label| y.iter().filter(|l| *l == label).count())
        .min()
        .unwrap_or(0);
    let n_folds = n_folds.min(smallest);
    if n_folds < 2 {
        return Err(Osm2kgError::InvalidData(format!(
            "cross validation needs at least 2 samples of each label, smallest class has {smallest}"
        )));
    }

    let mut folds = vec![Vec::new(); n_folds];
    let mut seen = [0usize; 2];
    for (i, label) in y.iter().enumerate() {
        let position = &mut seen[label.index()];
        folds[*position % n_folds].push(i);
        *position += 1;
    }
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{create_model, ParamValue};
    use ndarray::Array2;

    fn clusters(n_per_class: usize) -> (Array2<f64>, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i as f64 * 0.61).cos() * 0.4;
            rows.extend_from_slice(&[-1.5 + jitter, -1.0 + jitter * 0.5]);
            labels.push(Label::Correct);
            rows.extend_from_slice(&[1.5 - jitter, 1.0 + jitter]);
            labels.push(Label::Incorrect);
        }
        (Array2::from_shape_vec((2 * n_per_class, 2), rows).unwrap(), labels)
    }

    #[test]
    fn test_search_iterations_per_model() {
        for kind in ModelKind::ALL {
            let expected = if kind == ModelKind::DecisionTree { 2 } else { 100 };
            assert_eq!(search_iterations(kind), expected, "{kind}");
        }
    }

    #[test]
    fn test_configured_fold_count_is_used() {
        let (x, y) = clusters(6);
        let spec = create_model(ModelKind::DecisionTree, 2);
        let outcome = Optimizer::new(1, 2)
            .with_cv_folds(3)
            .fit(spec, x.view(), &y, false)
            .unwrap();
        assert_eq!(outcome.cv_score, Some(1.0));

        let spec = create_model(ModelKind::DecisionTree, 2);
        let single = Optimizer::new(1, 2).with_cv_folds(1).fit(spec, x.view(), &y, false);
        assert!(single.is_err());
    }

    #[test]
    fn test_stratified_folds_partition_samples() {
        let (_, y) = clusters(10);
        let folds = stratified_folds(&y, 5).unwrap();
        assert_eq!(folds.len(), 5);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
        for fold in &folds {
            let correct = fold.iter().filter(|i| y[**i] == Label::Correct).count();
            assert_eq!(correct, 2);
            assert_eq!(fold.len(), 4);
        }
    }

    #[test]
    fn test_fold_count_shrinks_to_smallest_class() {
        let y = vec![
            Label::Correct,
            Label::Correct,
            Label::Correct,
            Label::Incorrect,
            Label::Incorrect,
        ];
        assert_eq!(stratified_folds(&y, 5).unwrap().len(), 2);
        assert!(stratified_folds(&y[..4], 5).is_err());
    }

    #[test]
    fn test_debug_fit_uses_defaults() {
        let (x, y) = clusters(10);
        let spec = create_model(ModelKind::LogisticRegression, 2);
        let outcome = Optimizer::new(1, 2).fit(spec, x.view(), &y, true).unwrap();
        assert!(outcome.params.is_empty());
        assert!(outcome.cv_score.is_none());
        assert_eq!(outcome.model.classes(), &Label::ALL);
    }

    #[test]
    fn test_search_selects_valid_candidate() {
        let (x, y) = clusters(10);
        let spec = create_model(ModelKind::DecisionTree, 2);
        let outcome = Optimizer::new(2, 2).fit(spec, x.view(), &y, false).unwrap();

        assert_eq!(outcome.params.len(), 1);
        assert_eq!(outcome.cv_score, Some(1.0));
        let predicted = outcome.model.predict(x.view()).unwrap();
        assert_eq!(predicted, y);
    }

    #[test]
    fn test_search_is_reproducible_across_worker_counts() {
        let (x, y) = clusters(8);
        let run = |workers| {
            let spec = create_model(ModelKind::KNearestNeighbors, 4);
            Optimizer::new(workers, 4)
                .fit(spec, x.view(), &y, false)
                .unwrap()
        };
        let one = run(1);
        let four = run(4);
        assert_eq!(one.params, four.params);
        assert_eq!(one.cv_score, four.cv_score);
    }

    #[test]
    fn test_invalid_candidates_score_nan() {
        let (x, y) = clusters(6);
        let folds = stratified_folds(&y, 3).unwrap();
        let spec = create_model(ModelKind::LogisticRegression, 0);

        let invalid = vec![("C", ParamValue::Float(0.0))];
        assert!(cross_validate(spec.model.as_ref(), &invalid, x.view(), &y, &folds).is_nan());

        let valid = vec![("C", ParamValue::Float(1.0))];
        let score = cross_validate(spec.model.as_ref(), &valid, x.view(), &y, &folds);
        assert_eq!(score, 1.0);
    }
}
