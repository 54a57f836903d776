//! SMOTE class balancing
//!
//! Synthetic minority samples are interpolated between a random minority row
//! and one of its nearest minority neighbors until both classes have the same
//! number of rows. Only the training split is ever balanced.

use ndarray::{concatenate, Array2, ArrayView1, ArrayView2, Axis};
use osm2kg_core::{Label, Osm2kgError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const DEFAULT_NEIGHBORS: usize = 5;

/// Seeded SMOTE oversampler
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new(seed: u64) -> Self {
        Self {
            k_neighbors: DEFAULT_NEIGHBORS,
            seed,
        }
    }

    /// Neighbors to interpolate towards, at least one
    pub fn with_neighbors(mut self, k_neighbors: usize) -> Self {
        self.k_neighbors = k_neighbors.max(1);
        self
    }

    /// Balance the classes of `x`
    ///
    /// The original rows keep their order; synthetic minority rows are
    /// appended after them. Balanced input is returned unchanged.
    pub fn fit_resample(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[Label],
    ) -> Result<(Array2<f64>, Vec<Label>)> {
        if y.len() != x.nrows() {
            return Err(Osm2kgError::InvalidData(format!(
                "{} labels for {} feature rows",
                y.len(),
                x.nrows()
            )));
        }

        let mut counts = [0usize; 2];
        for label in y {
            counts[label.index()] += 1;
        }
        if counts[0] == counts[1] {
            return Ok((x.to_owned(), y.to_vec()));
        }

        let minority = if counts[0] < counts[1] {
            Label::ALL[0]
        } else {
            Label::ALL[1]
        };
        let minority_rows: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == minority)
            .map(|(i, _)| i)
            .collect();

        if minority_rows.len() < 2 {
            return Err(Osm2kgError::InvalidData(format!(
                "class '{minority}' has {} sample(s), SMOTE needs at least 2",
                minority_rows.len()
            )));
        }

        let samples = x.select(Axis(0), &minority_rows);
        let k = self.k_neighbors.min(samples.nrows() - 1);
        let neighbors = nearest_neighbors(samples.view(), k);
        let n_synthetic = counts[0].max(counts[1]) - minority_rows.len();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut synthetic = Array2::zeros((n_synthetic, x.ncols()));
        for mut row in synthetic.axis_iter_mut(Axis(0)) {
            let base = rng.gen_range(0..samples.nrows());
            let neighbor = neighbors[base][rng.gen_range(0..k)];
            let gap: f64 = rng.gen();

            let from = samples.row(base);
            let to = samples.row(neighbor);
            row.assign(&(&from + &((&to - &from) * gap)));
        }

        tracing::info!(
            minority = %minority,
            original = minority_rows.len(),
            synthetic = n_synthetic,
            "balanced training data"
        );

        let features = concatenate(Axis(0), &[x.view(), synthetic.view()])
            .map_err(|e| Osm2kgError::InvalidData(format!("balanced feature matrix: {e}")))?;
        let mut labels = y.to_vec();
        labels.extend(std::iter::repeat(minority).take(n_synthetic));
        Ok((features, labels))
    }
}

/// Indices of the `k` nearest other rows of every row
fn nearest_neighbors(samples: ArrayView2<'_, f64>, k: usize) -> Vec<Vec<usize>> {
    let n = samples.nrows();
    (0..n)
        .map(|i| {
            let mut distances: Vec<(f64, usize)> = (0..n)
                .filter(|j| *j != i)
                .map(|j| (squared_distance(samples.row(i), samples.row(j)), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
