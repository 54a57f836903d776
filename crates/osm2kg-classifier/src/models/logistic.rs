//! L2-regularized logistic regression

use ndarray::{Array1, Array2, ArrayView2};
use osm2kg_core::{Label, Result};

use super::{
    check_width, not_fitted, proba_from_positive, sigmoid, unknown_param, BinaryTargets,
    Classifier, ParamValue,
};

const MAX_ITER: usize = 1000;

/// Binary logistic regression fitted by full-batch gradient descent
///
/// Minimizes `||w||² / (2 C n) + mean log-loss`; the intercept is not
/// penalized. Iteration stops once every gradient component is within `tol`.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    c: f64,
    tol: f64,
    classes: Vec<Label>,
    weights: Array1<f64>,
    intercept: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-4,
            classes: Vec::new(),
            weights: Array1::zeros(0),
            intercept: 0.0,
        }
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "LogisticRegression"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => self.c = value.as_positive(name)?,
            "tol" => self.tol = value.as_non_negative(name)?,
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        let t = Array1::from(encoded.as_f64());
        let n = x.nrows() as f64;
        let penalty = 1.0 / (self.c * n);

        // Upper bound of the gradient's Lipschitz constant
        let mean_sq_norm = x.iter().map(|v| v * v).sum::<f64>() / n;
        let step = 1.0 / (0.25 * (1.0 + mean_sq_norm) + penalty);

        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0;
        for iteration in 0..MAX_ITER {
            let z = x.dot(&w) + b;
            let residual = z.mapv(sigmoid) - &t;

            let grad_w = x.t().dot(&residual) / n + &w * penalty;
            let grad_b = residual.sum() / n;

            let max_grad = grad_w
                .iter()
                .fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if max_grad <= self.tol {
                tracing::debug!(iteration, "logistic regression converged");
                break;
            }

            w = w - grad_w * step;
            b -= grad_b * step;
        }

        self.classes = encoded.classes;
        self.weights = w;
        self.intercept = b;
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(not_fitted(self.name()));
        }
        check_width(self.name(), self.weights.len(), &x)?;

        let z = x.dot(&self.weights) + self.intercept;
        Ok(proba_from_positive(z.iter().map(|v| sigmoid(*v))))
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
