//! k-nearest neighbors

use ndarray::{Array2, ArrayView2};
use osm2kg_core::{Label, Osm2kgError, Result};

use super::{
    check_width, invalid_param, not_fitted, unknown_param, BinaryTargets, Classifier, ParamValue,
};

/// Vote weighting of the neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

/// Brute-force Euclidean k-nearest neighbors
///
/// `leaf_size` is accepted for search-space compatibility but does not change
/// results, since neighbors are found by exhaustive search.
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    n_neighbors: usize,
    weighting: Weighting,
    leaf_size: usize,
    classes: Vec<Label>,
    points: Array2<f64>,
    targets: Vec<usize>,
}

impl Default for KNearestNeighbors {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weighting: Weighting::Uniform,
            leaf_size: 30,
            classes: Vec::new(),
            points: Array2::zeros((0, 0)),
            targets: Vec::new(),
        }
    }
}

impl KNearestNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }
}

impl Classifier for KNearestNeighbors {
    fn name(&self) -> &'static str {
        "KNeighborsClassifier"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.n_neighbors = value.as_count(name)?,
            "leaf_size" => self.leaf_size = value.as_count(name)?,
            "weights" => {
                self.weighting = match value.as_text(name)? {
                    "uniform" => Weighting::Uniform,
                    "distance" => Weighting::Distance,
                    _ => return Err(invalid_param(name, value)),
                }
            }
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        if self.n_neighbors > x.nrows() {
            return Err(Osm2kgError::Training(format!(
                "n_neighbors = {} exceeds {} training samples",
                self.n_neighbors,
                x.nrows()
            )));
        }
        self.classes = encoded.classes;
        self.targets = encoded.targets;
        self.points = x.to_owned();
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(not_fitted(self.name()));
        }
        check_width(self.name(), self.points.ncols(), &x)?;

        let mut proba = Array2::zeros((x.nrows(), 2));
        let mut distances: Vec<(f64, usize)> = Vec::with_capacity(self.points.nrows());

        for (i, query) in x.outer_iter().enumerate() {
            distances.clear();
            for (j, point) in self.points.outer_iter().enumerate() {
                let d: f64 = query
                    .iter()
                    .zip(point.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                distances.push((d, j));
            }
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let neighbors = &distances[..self.n_neighbors];

            let mut votes = [0.0; 2];
            match self.weighting {
                Weighting::Uniform => {
                    for (_, j) in neighbors {
                        votes[self.targets[*j]] += 1.0;
                    }
                }
                Weighting::Distance => {
                    let exact = neighbors.iter().any(|(d, _)| *d == 0.0);
                    for (d, j) in neighbors {
                        let weight = match (exact, *d == 0.0) {
                            (true, true) => 1.0,
                            (true, false) => 0.0,
                            _ => 1.0 / d,
                        };
                        votes[self.targets[*j]] += weight;
                    }
                }
            }

            let total = votes[0] + votes[1];
            proba[[i, 0]] = votes[0] / total;
            proba[[i, 1]] = votes[1] / total;
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

    fn line() -> (Array2<f64>, Vec<Label>) {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0]];
        let y = vec![
            Label::Correct,
            Label::Correct,
            Label::Correct,
            Label::Incorrect,
            Label::Incorrect,
        ];
        (x, y)
    }

    #[test]
    fn test_uniform_vote_fractions() {
        let (x, y) = line();
        let mut knn = KNearestNeighbors::new();
        knn.set_param("n_neighbors", &ParamValue::Int(5)).unwrap();
        knn.fit(x.view(), &y).unwrap();

        let proba = knn.predict_proba(array![[1.0]].view()).unwrap();
        assert!((proba[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((proba[[0, 1]] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting_prefers_close_points() {
        let (x, y) = line();
        let mut knn = KNearestNeighbors::new();
        knn.set_param("n_neighbors", &ParamValue::Int(3)).unwrap();
        knn.set_param("weights", &ParamValue::Text("distance")).unwrap();
        knn.fit(x.view(), &y).unwrap();

        // neighbors of 9: 10 (d=1), 11 (d=2), 2 (d=7)
        let proba = knn.predict_proba(array![[9.0]].view()).unwrap();
        let expected = (1.0 / 7.0) / (1.0 + 0.5 + 1.0 / 7.0);
        assert!((proba[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_exact_match_takes_whole_vote() {
        let (x, y) = line();
        let mut knn = KNearestNeighbors::new();
        knn.set_param("n_neighbors", &ParamValue::Int(5)).unwrap();
        knn.set_param("weights", &ParamValue::Text("distance")).unwrap();
        knn.fit(x.view(), &y).unwrap();

        let proba = knn.predict_proba(array![[10.0]].view()).unwrap();
        assert_eq!(proba[[0, 1]], 1.0);
    }

    #[test]
    fn test_separable_and_leaf_size() {
        let (x, y) = separable(10);
        let mut knn = KNearestNeighbors::new();
        knn.set_param("leaf_size", &ParamValue::Int(10)).unwrap();
        knn.fit(x.view(), &y).unwrap();
        assert_eq!(knn.leaf_size(), 10);

        let predicted = knn.predict(x.view()).unwrap();
        assert_eq!(accuracy(&y, &predicted), 1.0);
    }

    #[test]
    fn test_more_neighbors_than_samples() {
        let (x, y) = line();
        let mut knn = KNearestNeighbors::new();
        knn.set_param("n_neighbors", &ParamValue::Int(6)).unwrap();
        assert!(knn.fit(x.view(), &y).is_err());
        assert!(knn.set_param("weights", &ParamValue::Text("gaussian")).is_err());
    }
}
