//! OSM2KG key-value embeddings
//!
//! Learns a dense vector per OSM entity by predicting its tag keys and
//! values from the entity embedding through a softmax layer.
//!
//! # Pipeline
//!
//! 1. [`tags`] loads the tab-separated tag rows
//! 2. [`vocab`] assigns dense codes and caps the value vocabulary
//! 3. [`batch`] slices the records into (entity, key) and (entity, value) pairs
//! 4. [`train`] fits the [`model`] for a fixed number of epochs
//! 5. [`writer`] serializes the learned vectors

pub mod batch;
pub mod model;
pub mod pipeline;
pub mod tags;
pub mod train;
pub mod vocab;
pub mod writer;

pub use batch::{Batch, BatchGenerator};
pub use model::SkipGramModel;
pub use pipeline::{run_embedding, EmbeddingOutcome};
pub use tags::TagData;
pub use train::{EmbeddingTable, Trainer, TrainingReport};
pub use vocab::{encode, EncodedRecord, EncodedTags, Vocabulary, UNK};
pub use writer::{embedding_path, read_embeddings, write_embeddings};
