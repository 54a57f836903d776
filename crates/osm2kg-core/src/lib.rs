//! OSM2KG Core - Shared types, errors and configuration
//!
//! This crate defines the abstractions shared by the two OSM2KG learning
//! pipelines:
//! - Link labels produced and consumed by the binary link classifier
//! - Common error types
//! - Configuration values for classification and embedding runs

pub mod config;

pub use config::{
    ClassifierConfig, ConfigError, DatabaseConfig, EmbeddingConfig, LoggingConfig, ModelKind,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for OSM2KG operations
#[derive(Error, Debug)]
pub enum Osm2kgError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Osm2kgError {
    /// Wrap an IO error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for Osm2kgError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::FileReadError { path, source } => Self::Io { path, source },
            other => Self::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Osm2kgError>;

// ============================================================================
// Link Labels
// ============================================================================

/// Ground-truth or predicted label of an (OSM node, KG entity) candidate pair
///
/// The derived ordering matches the lexicographic order of the textual labels,
/// which is the class order a fitted classifier reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Correct,
    Incorrect,
}

impl Label {
    /// Fixed label set used for scoring, in column order of the results table
    pub const ALL: [Label; 2] = [Label::Correct, Label::Incorrect];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }

    /// Position of this label in [`Label::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Self::Correct => 0,
            Self::Incorrect => 1,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = Osm2kgError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            other => Err(Osm2kgError::InvalidData(format!(
                "unknown label '{other}', expected 'correct' or 'incorrect'"
            ))),
        }
    }
}
