//! Embedding pipeline
//!
//! Load tags → encode → train → write.

use std::path::{Path, PathBuf};

use osm2kg_core::{EmbeddingConfig, Osm2kgError, Result};

use crate::tags::TagData;
use crate::train::{Trainer, TrainingReport};
use crate::vocab::encode;
use crate::writer::{embedding_path, write_embeddings};

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct EmbeddingOutcome {
    pub output_path: PathBuf,
    pub entities: usize,
    pub report: TrainingReport,
}

/// Train embeddings for the tags in `input` and write them into `out_dir`
pub fn run_embedding(
    input: &Path,
    out_dir: &Path,
    config: &EmbeddingConfig,
) -> Result<EmbeddingOutcome> {
    let trainer = Trainer::new(config.clone())?;
    if !out_dir.is_dir() {
        return Err(Osm2kgError::Config(format!(
            "output directory {} does not exist",
            out_dir.display()
        )));
    }

    tracing::info!(path = %input.display(), "loading tag data");
    let data = TagData::load(input)?;
    let encoded = encode(&data, config.num_values)?;
    drop(data);

    let (table, report) = trainer.train(&encoded)?;

    let output_path = embedding_path(out_dir, input, config.embedding_dim, config.epochs);
    write_embeddings(&output_path, &table)?;

    Ok(EmbeddingOutcome {
        output_path,
        entities: table.len(),
        report,
    })
}
