//! Multi-layer perceptron
//!
//! One hidden layer of ReLU units feeding a logistic output, trained with
//! Adam on shuffled mini-batches. Training stops after `MAX_ITER` epochs or
//! once the epoch loss has not improved by `TOL` for `N_ITER_NO_CHANGE`
//! consecutive epochs.

use ndarray::{Array, Array1, Array2, ArrayView2, Axis, Dimension, Zip};
use osm2kg_core::{Label, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{
    check_width, not_fitted, proba_from_positive, sigmoid, unknown_param, BinaryTargets,
    Classifier, ParamValue,
};

const HIDDEN_UNITS: usize = 10;
const ALPHA: f64 = 1e-4;
const BATCH_SIZE: usize = 200;
const MAX_ITER: usize = 200;
const TOL: f64 = 1e-4;
const N_ITER_NO_CHANGE: usize = 10;

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone)]
struct Layers {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl Layers {
    /// Glorot-uniform initialization
    fn init<R: Rng>(n_features: usize, rng: &mut R) -> Self {
        let mut uniform = |fan_in: usize, fan_out: usize| {
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            (
                Array2::from_shape_simple_fn((fan_in, fan_out), || rng.gen_range(-bound..bound)),
                Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bound..bound)),
            )
        };
        let (w1, b1) = uniform(n_features, HIDDEN_UNITS);
        let (w2, b2) = uniform(HIDDEN_UNITS, 1);
        Self { w1, b1, w2, b2 }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w1: Array2::zeros(self.w1.raw_dim()),
            b1: Array1::zeros(self.b1.raw_dim()),
            w2: Array2::zeros(self.w2.raw_dim()),
            b2: Array1::zeros(self.b2.raw_dim()),
        }
    }

    /// Hidden pre-activations and output probabilities
    fn forward(&self, x: &ArrayView2<'_, f64>) -> (Array2<f64>, Array1<f64>) {
        let z1 = x.dot(&self.w1) + &self.b1;
        let a1 = z1.mapv(|v| v.max(0.0));
        let z2 = a1.dot(&self.w2) + &self.b2;
        let p = z2.column(0).mapv(sigmoid);
        (z1, p)
    }

    fn penalty(&self) -> f64 {
        self.w1.iter().chain(self.w2.iter()).map(|w| w * w).sum()
    }
}

/// Adam moment estimates for every parameter tensor
#[derive(Debug)]
struct Adam {
    step: i32,
    learning_rate: f64,
    m: Layers,
    v: Layers,
}

impl Adam {
    fn new(shape: &Layers, learning_rate: f64) -> Self {
        Self {
            step: 0,
            learning_rate,
            m: shape.zeros_like(),
            v: shape.zeros_like(),
        }
    }

    fn update(&mut self, params: &mut Layers, grads: &Layers) {
        self.step += 1;
        let lr = self.learning_rate * (1.0 - BETA_2.powi(self.step)).sqrt()
            / (1.0 - BETA_1.powi(self.step));

        adam_step(&mut params.w1, &grads.w1, &mut self.m.w1, &mut self.v.w1, lr);
        adam_step(&mut params.b1, &grads.b1, &mut self.m.b1, &mut self.v.b1, lr);
        adam_step(&mut params.w2, &grads.w2, &mut self.m.w2, &mut self.v.w2, lr);
        adam_step(&mut params.b2, &grads.b2, &mut self.m.b2, &mut self.v.b2, lr);
    }
}

fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, g, m, v| {
            *m = BETA_1 * *m + (1.0 - BETA_1) * g;
            *v = BETA_2 * *v + (1.0 - BETA_2) * g * g;
            *p -= lr * *m / (v.sqrt() + EPSILON);
        });
}

/// Feed-forward network classifier
#[derive(Debug, Clone)]
pub struct NeuralNetwork {
    seed: u64,
    learning_rate: f64,
    classes: Vec<Label>,
    layers: Option<Layers>,
    loss_curve: Vec<f64>,
}

impl NeuralNetwork {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            learning_rate: 1e-3,
            classes: Vec::new(),
            layers: None,
            loss_curve: Vec::new(),
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Mean training loss of every completed epoch
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Log-loss plus L2 penalty of one batch, and its gradients
    fn backprop(
        layers: &Layers,
        x: &ArrayView2<'_, f64>,
        t: &Array1<f64>,
    ) -> (f64, Layers) {
        let m = x.nrows() as f64;
        let (z1, p) = layers.forward(x);
        let a1 = z1.mapv(|v| v.max(0.0));

        let log_loss = p
            .iter()
            .zip(t.iter())
            .map(|(p, t)| {
                let p = p.clamp(1e-15, 1.0 - 1e-15);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum::<f64>()
            / m;
        let loss = log_loss + 0.5 * ALPHA * layers.penalty() / m;

        let delta2 = ((&p - t) / m).insert_axis(Axis(1));
        let w2 = a1.t().dot(&delta2) + &layers.w2 * (ALPHA / m);
        let b2 = delta2.sum_axis(Axis(0));

        let mut delta1 = delta2.dot(&layers.w2.t());
        Zip::from(&mut delta1).and(&z1).for_each(|d, z| {
            if *z <= 0.0 {
                *d = 0.0;
            }
        });
        let w1 = x.t().dot(&delta1) + &layers.w1 * (ALPHA / m);
        let b1 = delta1.sum_axis(Axis(0));

        (loss, Layers { w1, b1, w2, b2 })
    }
}

impl Classifier for NeuralNetwork {
    fn name(&self) -> &'static str {
        "MLPClassifier"
    }

    fn set_param(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(unknown_param(self.name(), name))
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> Result<()> {
        let encoded = BinaryTargets::encode(y, x.nrows())?;
        let targets = Array1::from(encoded.as_f64());
        let n = x.nrows();
        let batch_size = BATCH_SIZE.min(n);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut layers = Layers::init(x.ncols(), &mut rng);
        let mut adam = Adam::new(&layers, self.learning_rate);
        let mut order: Vec<usize> = (0..n).collect();

        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        self.loss_curve.clear();

        for epoch in 0..MAX_ITER {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let tb = targets.select(Axis(0), batch);
                let (loss, grads) = Self::backprop(&layers, &xb.view(), &tb);
                adam.update(&mut layers, &grads);
                epoch_loss += loss * batch.len() as f64;
            }

            epoch_loss /= n as f64;
            self.loss_curve.push(epoch_loss);

            if epoch_loss > best_loss - TOL {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(epoch_loss);

            if no_improvement > N_ITER_NO_CHANGE {
                tracing::debug!(epoch, loss = epoch_loss, "training loss stopped improving");
                break;
            }
        }

        self.classes = encoded.classes;
        self.layers = Some(layers);
        Ok(())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let layers = self.layers.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        check_width(self.name(), layers.w1.nrows(), &x)?;

        let (_, p) = layers.forward(&x);
        Ok(proba_from_positive(p.iter().copied()))
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
    fn test_learns_separable_clusters() {
        let (x, y) = separable(50);
        let mut mlp = NeuralNetwork::new(2).with_learning_rate(0.01);
        mlp.fit(x.view(), &y).unwrap();

        let predicted = mlp.predict(x.view()).unwrap();
        assert!(accuracy(&y, &predicted) >= 0.95);
    }

    #[test]
    fn test_loss_decreases() {
        let (x, y) = separable(30);
        let mut mlp = NeuralNetwork::new(5);
        mlp.fit(x.view(), &y).unwrap();

        let curve = mlp.loss_curve();
        assert!(!curve.is_empty() && curve.len() <= MAX_ITER);
        assert!(curve[curve.len() - 1] < curve[0]);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let (x, y) = separable(15);
        let probe = array![[0.5, -0.5], [1.0, 1.0]];
        let run = || {
            let mut mlp = NeuralNetwork::new(9);
            mlp.fit(x.view(), &y).unwrap();
            mlp.predict_proba(probe.view()).unwrap()
        };

        let proba = run();
        assert_eq!(proba, run());
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let (x, y) = separable(4);
        let t = Array1::from(BinaryTargets::encode(&y, x.nrows()).unwrap().as_f64());
        let layers = Layers::init(2, &mut ChaCha8Rng::seed_from_u64(1));
        let (_, grads) = NeuralNetwork::backprop(&layers, &x.view(), &t);

        let h = 1e-6;
        let mut shifted = layers.clone();
        shifted.w2[[3, 0]] += h;
        let (plus, _) = NeuralNetwork::backprop(&shifted, &x.view(), &t);
        shifted.w2[[3, 0]] -= 2.0 * h;
        let (minus, _) = NeuralNetwork::backprop(&shifted, &x.view(), &t);

        let numeric = (plus - minus) / (2.0 * h);
        assert!((numeric - grads.w2[[3, 0]]).abs() < 1e-5);
    }
}
