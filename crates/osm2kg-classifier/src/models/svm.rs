//! Support vector machines
//!
//! Fitted with `linfa-svm` over a linear or a Gaussian kernel. The model is
//! trained with Platt-calibrated targets so every prediction carries the
//! probability of the second class.
//!
//! `linfa` is built on an older `ndarray` than the rest of the workspace, so
//! feature matrices are copied into its array type at the boundary.

use std::sync::Arc;

use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa::Dataset;
use linfa_ndarray as nd;
use linfa_svm::Svm;
use ndarray::{Array2, ArrayView2};
use osm2kg_core::{Label, Osm2kgError, Result};

use super::{
    check_width, not_fitted, proba_from_positive, unknown_param, BinaryTargets, Classifier,
    ParamValue,
};

/// Kernel function of a support vector machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Linear,
    /// Gaussian kernel, gamma = 1 / (features × variance of the training matrix)
    Rbf,
}

/// Probability-enabled support vector classifier
#[derive(Clone)]
pub struct SupportVectorMachine {
    kernel: Kernel,
    c: f64,
    tol: f64,
    classes: Vec<Label>,
    n_features: usize,
    gamma: f64,
    model: Option<Arc<Svm<f64, Pr>>>,
}

impl std::fmt::Debug for SupportVectorMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportVectorMachine")
            .field("kernel", &self.kernel)
            .field("c", &self.c)
            .field("tol", &self.tol)
            .field("gamma", &self.gamma)
            .field("fitted", &self.model.is_some())
            .finish()
    }
}

impl SupportVectorMachine {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            c: 1.0,
            tol: 1e-3,
            classes: Vec::new(),
            n_features: 0,
            gamma: 1.0,
            model: None,
        }
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Kernel width used by the last fit (1 for the linear kernel)
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Training samples with a non-zero dual coefficient
    pub fn n_support(&self) -> usize {
        self.model
            .as_ref()
            .map_or(0, |m| m.alpha.iter().filter(|a| a.abs() > 0.0).count())
    }

    fn fitted(&self) -> Result<&Svm<f64, Pr>> {
        self.model.as_deref().ok_or_else(|| not_fitted(self.name()))
    }
}

/// Row-major copy into the array type `linfa` works on
fn to_linfa(x: ArrayView2<'_, f64>) -> Result<nd::Array2<f64>> {
    nd::Array2::from_shape_vec(x.dim(), x.iter().copied().collect())
        .map_err(|e| Osm2kgError::InvalidData(format!("feature matrix: {e}")))
}

impl Classifier for SupportVectorMachine {
    fn name(&self) -> &'static str {
        "SVC"
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
        let targets: nd::Array1<bool> = encoded.targets.iter().map(|t| *t == 1).collect();
        let dataset = Dataset::new(to_linfa(x)?, targets);

        let params = Svm::<f64, Pr>::params()
            .pos_neg_weights(self.c, self.c)
            .eps(self.tol);
        let fitted = match self.kernel {
            Kernel::Linear => {
                self.gamma = 1.0;
                params.linear_kernel().fit(&dataset)
            }
            Kernel::Rbf => {
                let variance = x.var(0.0);
                self.gamma = if variance > 0.0 {
                    1.0 / (x.ncols() as f64 * variance)
                } else {
                    1.0
                };
                // linfa's Gaussian kernel is exp(-|a - b|² / eps)
                params.gaussian_kernel(1.0 / self.gamma).fit(&dataset)
            }
        }
        .map_err(|e| Osm2kgError::Training(format!("SVC: {e}")))?;

        self.classes = encoded.classes;
        self.n_features = x.ncols();
        self.model = Some(Arc::new(fitted));
        tracing::debug!(
            kernel = ?self.kernel,
            support_vectors = self.n_support(),
            "support vector machine fitted"
        );
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let model = self.fitted()?;
        check_width(self.name(), self.n_features, &x)?;

        let positive: nd::Array1<Pr> = model.predict(&to_linfa(x)?);
        Ok(proba_from_positive(positive.iter().map(|p| f64::from(**p))))
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
