//! Embedding training loop

use std::time::{Duration, Instant};

use ndarray::Array2;
use osm2kg_core::{EmbeddingConfig, Osm2kgError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::batch::BatchGenerator;
use crate::model::SkipGramModel;
use crate::vocab::EncodedTags;

/// Learned vectors keyed by the original entity ids
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    /// Entity id of every row of `vectors`
    pub ids: Vec<String>,
    pub vectors: Array2<f32>,
}

impl EmbeddingTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vector(&self, id: &str) -> Option<ndarray::ArrayView1<'_, f32>> {
        self.ids
            .iter()
            .position(|candidate| candidate == id)
            .map(|row| self.vectors.row(row))
    }
}

/// Loss history of a training run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingReport {
    /// Mean training cross-entropy per epoch
    pub epoch_losses: Vec<f32>,
    /// Mean held-out cross-entropy per epoch (empty without validation records)
    pub validation_losses: Vec<f32>,
    pub elapsed: Duration,
}

/// Trains entity embeddings on encoded tag records
#[derive(Debug, Clone)]
pub struct Trainer {
    config: EmbeddingConfig,
}

impl Trainer {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Run the configured number of epochs over all batches
    pub fn train(&self, encoded: &EncodedTags) -> Result<(EmbeddingTable, TrainingReport)> {
        let records = &encoded.records;
        if records.is_empty() {
            return Err(Osm2kgError::InvalidData(
                "no tag records to train on".to_string(),
            ));
        }
        let held_out = self.config.validation_records;
        if held_out >= records.len() {
            return Err(Osm2kgError::Config(format!(
                "{held_out} validation records leave nothing to train on ({} records)",
                records.len()
            )));
        }
        let (train_records, validation_records) = records.split_at(records.len() - held_out);

        let vocab = &encoded.vocab;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut model = SkipGramModel::new(
            vocab.num_entities(),
            vocab.output_size(),
            self.config.embedding_dim,
            &mut rng,
        )?;

        let per_batch = self.config.records_per_batch();
        let batches = BatchGenerator::new(train_records, per_batch, vocab.num_keys());
        let validation = BatchGenerator::new(validation_records, per_batch, vocab.num_keys());

        tracing::info!(
            records = train_records.len(),
            held_out,
            batches = batches.num_batches(),
            epochs = self.config.epochs,
            dim = self.config.embedding_dim,
            "starting embedding training"
        );

        let start = Instant::now();
        let mut report = TrainingReport::default();
        for epoch in 0..self.config.epochs {
            let mut total = 0.0f32;
            let mut pairs = 0usize;
            for batch in batches.iter() {
                let loss = model.train_step(&batch, self.config.learning_rate);
                total += loss * batch.len() as f32;
                pairs += batch.len();
            }
            let mean = total / pairs as f32;
            report.epoch_losses.push(mean);

            if held_out > 0 {
                let mut total = 0.0f32;
                let mut pairs = 0usize;
                for batch in validation.iter() {
                    total += model.loss(&batch) * batch.len() as f32;
                    pairs += batch.len();
                }
                let validation_loss = total / pairs as f32;
                report.validation_losses.push(validation_loss);
                tracing::info!(epoch = epoch + 1, loss = mean, validation_loss, "epoch finished");
            } else {
                tracing::info!(epoch = epoch + 1, loss = mean, "epoch finished");
            }
        }
        report.elapsed = start.elapsed();
        tracing::info!(seconds = report.elapsed.as_secs_f64(), "training of embeddings finished");

        let table = EmbeddingTable {
            ids: vocab.entity_ids().to_vec(),
            vectors: model.into_embeddings(),
        };
        Ok((table, report))
    }
}
