//! Feature standardization

use ndarray::{Array1, Array2, ArrayView2, Axis};
use osm2kg_core::{Osm2kgError, Result};

/// Zero-mean, unit-variance scaling fitted on the training features
///
/// Columns with zero variance keep a scale of 1 so they are only centered.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            Osm2kgError::InvalidData("cannot fit a scaler on zero rows".to_string())
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(Osm2kgError::InvalidData(format!(
                "scaler fitted on {} features, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardizes_columns() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));
        assert!((scaled.column(0).std(0.0) - 1.0).abs() < 1e-12);
        // constant column is centered only
        assert_eq!(scaler.scale()[1], 1.0);
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_applies_training_statistics_to_new_rows() {
        let train = array![[0.0], [2.0]];
        let scaler = StandardScaler::fit(train.view()).unwrap();
        let scaled = scaler.transform(array![[4.0]].view()).unwrap();
        assert_eq!(scaled[[0, 0]], 3.0);
        assert!(scaler.transform(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(x.view()).is_err());
    }
}
