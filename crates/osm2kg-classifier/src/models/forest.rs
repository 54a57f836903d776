//! Random forest of bootstrapped CART trees

use ndarray::{Array2, ArrayView2};
use osm2kg_core::{Label, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::tree::{Criterion, TreeModel};
use super::{check_width, not_fitted, unknown_param, BinaryTargets, Classifier, ParamValue};

const DEFAULT_ESTIMATORS: usize = 100;

/// Bagged trees with `sqrt(features)` candidates per split
///
/// Each tree draws its own seed from the forest seed before growing, so the
/// result does not depend on how trees are scheduled across threads.
#[derive(Debug, Clone)]
pub struct RandomForest {
    criterion: Criterion,
    n_estimators: usize,
    seed: u64,
    classes: Vec<Label>,
    trees: Vec<TreeModel>,
}

impl RandomForest {
    pub fn new(seed: u64) -> Self {
        Self {
            criterion: Criterion::Gini,
            n_estimators: DEFAULT_ESTIMATORS,
            seed,
            classes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "RandomForestClassifier"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "criterion" => self.criterion = Criterion::from_param(name, value)?,
            "n_estimators" => self.n_estimators = value.as_count(name)?,
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        let n_rows = x.nrows();
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);

        let mut seeder = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_estimators).map(|_| seeder.gen()).collect();

        let criterion = self.criterion;
        let targets = &encoded.targets;
        self.trees = tree_seeds
            .par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                let bootstrap: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
                TreeModel::grow(x, targets, bootstrap, criterion, Some(max_features), &mut rng)
            })
            .collect();

        tracing::debug!(trees = self.trees.len(), max_features, "random forest grown");
        self.classes = encoded.classes;
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let first = self.trees.first().ok_or_else(|| not_fitted(self.name()))?;
        check_width(self.name(), first.n_features(), &x)?;

        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.outer_iter().enumerate() {
            for tree in &self.trees {
                let leaf = tree.leaf_proba(row);
                proba[[i, 0]] += leaf[0];
                proba[[i, 1]] += leaf[1];
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{accuracy, separable};
    use ndarray::{array, Axis};

    #[test]
    fn test_forest_separates_clusters() {
        let (x, y) = separable(20);
        let mut forest = RandomForest::new(2);
        forest.set_param("n_estimators", &ParamValue::Int(15)).unwrap();
        forest.fit(x.view(), &y).unwrap();

        assert_eq!(forest.n_trees(), 15);
        let predicted = forest.predict(x.view()).unwrap();
        assert_eq!(accuracy(&y, &predicted), 1.0);
    }

    #[test]
    fn test_probabilities_average_over_trees() {
        let (x, y) = separable(10);
        let mut forest = RandomForest::new(7);
        forest.set_param("n_estimators", &ParamValue::Int(5)).unwrap();
        forest.fit(x.view(), &y).unwrap();

        let proba = forest.predict_proba(array![[0.0, 0.0], [3.0, 3.0]].view()).unwrap();
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(proba[[1, 1]], 1.0);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable(12);
        let probe = array![[0.3, -0.1], [-0.2, 0.4], [1.0, -1.0]];

        let run = |seed| {
            let mut forest = RandomForest::new(seed);
            forest.set_param("n_estimators", &ParamValue::Int(8)).unwrap();
            forest.fit(x.view(), &y).unwrap();
            forest.predict_proba(probe.view()).unwrap()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_rejects_zero_estimators() {
        let mut forest = RandomForest::new(0);
        assert!(forest.set_param("n_estimators", &ParamValue::Int(0)).is_err());
        assert!(forest.set_param("max_depth", &ParamValue::Int(3)).is_err());
    }
}
