//! OSM2KG link classifier
//!
//! Trains a binary classifier on feature vectors of (OSM node, KG entity)
//! candidate pairs, scores it on a held-out fold, stores the scores and
//! writes per-candidate predictions for the linking process.
//!
//! # Pipeline
//!
//! 1. [`data`] loads the tab-separated training and test files
//! 2. [`smote`] balances the training labels
//! 3. [`preprocessing`] standardizes the features
//! 4. [`models`] and [`search`] create and fit the configured classifier
//! 5. [`metrics`] scores the test predictions and [`store`] persists them
//! 6. [`output`] writes the prediction file

pub mod data;
pub mod metrics;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod preprocessing;
pub mod search;
pub mod smote;
pub mod store;

pub use data::LabeledData;
pub use metrics::{ClassificationReport, ConfusionMatrix, Scores};
pub use models::{create_model, Classifier, ModelSpec, ParamValue, SearchSpace};
pub use output::{prediction_path, PredictionRecord};
pub use pipeline::{run_classification, ClassificationJob, ClassificationOutcome};
pub use preprocessing::StandardScaler;
pub use search::{FitOutcome, Optimizer};
pub use smote::Smote;
pub use store::{ClassificationResult, InMemoryResults, PgResultsStore, ResultsRepository};
