//! Skip-gram style key-value network
//!
//! An entity embedding lookup feeds a full softmax over all key and value
//! codes. Training is plain gradient descent on the mean cross-entropy of a
//! batch.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use osm2kg_core::{Osm2kgError, Result};

use crate::batch::Batch;

/// Embedding table and softmax projection
#[derive(Debug, Clone)]
pub struct SkipGramModel {
    /// (entities, dim), initialized uniformly in [-1, 1)
    embeddings: Array2<f32>,
    /// (outputs, dim), truncated normal with std 1/sqrt(dim)
    weights: Array2<f32>,
    biases: Array1<f32>,
}

impl SkipGramModel {
    pub fn new<R: Rng>(
        num_entities: usize,
        num_outputs: usize,
        dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(Osm2kgError::Config("embedding dimension must be positive".to_string()));
        }

        let uniform = Uniform::new(-1.0f32, 1.0);
        let embeddings =
            Array2::from_shape_simple_fn((num_entities, dim), || uniform.sample(&mut *rng));

        let std_dev = 1.0 / (dim as f32).sqrt();
        let normal = Normal::new(0.0f32, std_dev)
            .map_err(|e| Osm2kgError::Config(format!("weight initializer: {e}")))?;
        let weights = Array2::from_shape_simple_fn((num_outputs, dim), || loop {
            // redraw beyond two standard deviations
            let w = normal.sample(&mut *rng);
            if w.abs() <= 2.0 * std_dev {
                break w;
            }
        });

        Ok(Self {
            embeddings,
            weights,
            biases: Array1::zeros(num_outputs),
        })
    }

    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    pub fn into_embeddings(self) -> Array2<f32> {
        self.embeddings
    }

    pub fn dim(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Row-wise softmax of the batch logits and the gathered hidden layer
    fn forward(&self, batch: &Batch) -> (Array2<f32>, Array2<f32>) {
        let hidden = self.embeddings.select(Axis(0), &batch.inputs);
        let mut probs = hidden.dot(&self.weights.t()) + &self.biases;
        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row /= total;
        }
        (hidden, probs)
    }

    fn cross_entropy(probs: &Array2<f32>, targets: &[usize]) -> f32 {
        let total: f32 = targets
            .iter()
            .enumerate()
            .map(|(i, t)| -probs[[i, *t]].max(f32::MIN_POSITIVE).ln())
            .sum();
        total / targets.len() as f32
    }

    /// Mean cross-entropy of a batch without updating
    pub fn loss(&self, batch: &Batch) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }
        let (_, probs) = self.forward(batch);
        Self::cross_entropy(&probs, &batch.targets)
    }

    /// One gradient descent step; returns the loss before the update
    pub fn train_step(&mut self, batch: &Batch, learning_rate: f32) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }
        let m = batch.len() as f32;
        let (hidden, mut grad_logits) = self.forward(batch);
        let loss = Self::cross_entropy(&grad_logits, &batch.targets);

        for (i, target) in batch.targets.iter().enumerate() {
            grad_logits[[i, *target]] -= 1.0;
        }
        grad_logits /= m;

        let grad_weights = grad_logits.t().dot(&hidden);
        let grad_biases = grad_logits.sum_axis(Axis(0));
        let grad_hidden = grad_logits.dot(&self.weights);

        self.weights.scaled_add(-learning_rate, &grad_weights);
        self.biases.scaled_add(-learning_rate, &grad_biases);
        for (row, entity) in grad_hidden.axis_iter(Axis(0)).zip(&batch.inputs) {
            let mut embedding = self.embeddings.row_mut(*entity);
            embedding.scaled_add(-learning_rate, &row);
        }

        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model(seed: u64) -> SkipGramModel {
        SkipGramModel::new(3, 6, 4, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap()
    }

    fn batch() -> Batch {
        Batch {
            inputs: vec![0, 0, 1, 1, 2, 2],
            targets: vec![0, 2, 1, 3, 0, 5],
        }
    }

    #[test]
    fn test_initialization_ranges() {
        let m = model(1);
        assert_eq!(m.embeddings().dim(), (3, 4));
        assert!(m.embeddings().iter().all(|v| (-1.0..1.0).contains(v)));
        assert!(m.weights.iter().all(|w| w.abs() <= 2.0 * 0.5));
        assert!(m.biases.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn test_initial_loss_near_uniform_softmax() {
        let m = model(2);
        let loss = m.loss(&batch());
        // six outputs: ln 6 ≈ 1.79, small random logits stay close
        assert!(loss > 0.5 && loss < 4.0);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut m = model(3);
        let b = batch();
        let first = m.train_step(&b, 1.0);
        for _ in 0..50 {
            m.train_step(&b, 1.0);
        }
        assert!(m.loss(&b) < first);
    }

    #[test]
    fn test_only_batch_entities_move() {
        let mut m = SkipGramModel::new(4, 6, 4, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
        let untouched = m.embeddings().row(3).to_owned();
        m.train_step(&batch(), 1.0);
        assert_eq!(m.embeddings().row(3), untouched);
    }

    #[test]
    fn test_same_seed_same_weights() {
        assert_eq!(model(9).embeddings(), model(9).embeddings());
        assert!(SkipGramModel::new(1, 1, 0, &mut ChaCha8Rng::seed_from_u64(0)).is_err());
    }
}
