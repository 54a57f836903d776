//! Gaussian naive Bayes

use ndarray::{Array1, Array2, ArrayView2, Axis};
use osm2kg_core::{Label, Result};

use super::{check_width, not_fitted, unknown_param, BinaryTargets, Classifier, ParamValue};

const VAR_SMOOTHING: f64 = 1e-9;

/// Gaussian naive Bayes with per-class feature means and variances
#[derive(Debug, Clone, Default)]
pub struct GaussianNaiveBayes {
    classes: Vec<Label>,
    /// (classes, features)
    means: Array2<f64>,
    /// (classes, features), smoothed
    variances: Array2<f64>,
    log_priors: Array1<f64>,
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    fn joint_log_likelihood(&self, x: &ArrayView2<'_, f64>) -> Array2<f64> {
        let n_classes = self.classes.len();
        let mut jll = Array2::zeros((x.nrows(), n_classes));
        for c in 0..n_classes {
            let means = self.means.row(c);
            let vars = self.variances.row(c);
            let norm: f64 = vars
                .iter()
                .map(|v| (2.0 * std::f64::consts::PI * v).ln())
                .sum::<f64>()
                * -0.5;
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                let mahalanobis: f64 = row
                    .iter()
                    .zip(means.iter().zip(vars.iter()))
                    .map(|(xi, (m, v))| (xi - m).powi(2) / v)
                    .sum();
                jll[[i, c]] = self.log_priors[c] + norm - 0.5 * mahalanobis;
            }
        }
        jll
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "GaussianNB"
    }

    fn set_param(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(unknown_param(self.name(), name))
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        let n_features = x.ncols();

        let max_variance = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        let epsilon = if max_variance > 0.0 {
            VAR_SMOOTHING * max_variance
        } else {
            VAR_SMOOTHING
        };

        let mut means = Array2::zeros((2, n_features));
        let mut variances = Array2::zeros((2, n_features));
        let mut log_priors = Array1::zeros(2);

        for c in 0..2 {
            let rows: Vec<usize> = encoded
                .targets
                .iter()
                .enumerate()
                .filter(|(_, t)| **t == c)
                .map(|(i, _)| i)
                .collect();
            let subset = x.select(Axis(0), &rows);
            let class_means = subset.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
            let class_vars = subset.var_axis(Axis(0), 0.0) + epsilon;

            means.row_mut(c).assign(&class_means);
            variances.row_mut(c).assign(&class_vars);
            log_priors[c] = (rows.len() as f64 / x.nrows() as f64).ln();
        }

        self.classes = encoded.classes;
        self.means = means;
        self.variances = variances;
        self.log_priors = log_priors;
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(not_fitted(self.name()));
        }
        check_width(self.name(), self.means.ncols(), &x)?;

        let mut proba = self.joint_log_likelihood(&x);
        for mut row in proba.axis_iter_mut(Axis(0)) {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
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
    use ndarray::array;

    #[test]
    fn test_fit_predict_separable() {
        let (x, y) = separable(20);
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(x.view(), &y).unwrap();

        let predicted = nb.predict(x.view()).unwrap();
        assert_eq!(accuracy(&y, &predicted), 1.0);
        assert_eq!(nb.classes(), &[Label::Correct, Label::Incorrect]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable(10);
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(x.view(), &y).unwrap();

        let proba = nb.predict_proba(array![[0.1, -0.3], [5.0, 5.0]].view()).unwrap();
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[1, 1]] > 0.99);
    }

    #[test]
    fn test_constant_features_do_not_divide_by_zero() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let y = vec![Label::Correct, Label::Incorrect, Label::Correct, Label::Incorrect];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(x.view(), &y).unwrap();

        let proba = nb.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unfitted_and_width_errors() {
        let nb = GaussianNaiveBayes::new();
        assert!(nb.predict_proba(array![[0.0]].view()).is_err());

        let (x, y) = separable(5);
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(x.view(), &y).unwrap();
        assert!(nb.predict_proba(array![[0.0, 1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_has_no_hyperparameters() {
        let mut nb = GaussianNaiveBayes::new();
        assert!(nb.set_param("var_smoothing", &ParamValue::Float(1e-9)).is_err());
    }
}
