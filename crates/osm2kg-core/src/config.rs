//! OSM2KG Configuration Management
//!
//! Handles the line-oriented `key=value` configuration file shared with the
//! OSM2KG linking experiments, environment overrides for database
//! credentials, and the parameter values of embedding runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default seed of every randomized stage (balancing, search, seeded models)
pub const DEFAULT_SEED: u64 = 2;

// ============================================================================
// Classifier Run Configuration
// ============================================================================

/// Configuration of a single link classification run
///
/// Parsed once from the experiment configuration file and passed by reference
/// to every pipeline stage that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// The classifier family to train
    pub model: ModelKind,

    /// Fit with default hyperparameters instead of running a search
    pub debug: bool,

    /// Results database connection
    pub database: DatabaseConfig,

    /// Seed for balancing, search sampling and seeded models
    pub seed: u64,

    /// Worker threads for the hyperparameter search (None = caller decides)
    pub workers: Option<usize>,
}

impl ClassifierConfig {
    /// Create a configuration for a model with all other settings at their defaults
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            debug: true,
            database: DatabaseConfig::default(),
            seed: DEFAULT_SEED,
            workers: None,
        }
    }

    /// Load from a `key=value` configuration file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration text
    ///
    /// Lines that do not split into exactly one key and one value are skipped,
    /// as are unknown keys. Every classifier listed must be known; when more
    /// than one is listed the last one is used.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let mut models: Option<Vec<ModelKind>> = None;
        let mut debug = true;
        let mut database = DatabaseConfig::default();
        let mut seed = DEFAULT_SEED;
        let mut workers = None;

        for (key, value) in key_value_pairs(content) {
            match key {
                "classifier" => {
                    models = Some(
                        value
                            .split(',')
                            .map(str::parse::<ModelKind>)
                            .collect::<Result<Vec<ModelKind>, _>>()?,
                    );
                }
                "debug" => debug = value == "true",
                "dbHost" => database.host = value.to_string(),
                "dbPort" => database.port = parse_value(key, value)?,
                "dbUser" => database.user = value.to_string(),
                "dbName" => database.name = value.to_string(),
                "dbPassword" => database.password = value.to_string(),
                "seed" => seed = parse_value(key, value)?,
                "workers" => {
                    let n: usize = parse_value(key, value)?;
                    if n == 0 {
                        return Err(ConfigError::InvalidValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                    workers = Some(n);
                }
                _ => {}
            }
        }

        let models = models.ok_or_else(|| ConfigError::MissingRequired("classifier".to_string()))?;
        if models.len() > 1 {
            tracing::warn!(
                configured = ?models.iter().map(ModelKind::id).collect::<Vec<_>>(),
                "several classifiers configured, only the last one is trained"
            );
        }
        let model = *models
            .last()
            .ok_or_else(|| ConfigError::MissingRequired("classifier".to_string()))?;

        Ok(Self {
            model,
            debug,
            database,
            seed,
            workers,
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = parse_value("DB_PORT", &port)?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        // Always use env for sensitive values
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }

        Ok(self)
    }
}

/// Iterate over the well-formed `key=value` lines of a configuration text
///
/// Each line is trimmed and split on `=`; lines yielding anything other than
/// exactly two parts are ignored.
pub fn key_value_pairs(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(|line| {
        let mut parts = line.trim().split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => Some((key, value)),
            _ => None,
        }
    })
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Supported classifier families, keyed by their configuration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearSvm,
    DecisionTree,
    RandomForest,
    KNearestNeighbors,
    LogisticRegression,
    KernelSvm,
    NaiveBayes,
    NeuralNetwork,
    GradientBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 9] = [
        ModelKind::LinearSvm,
        ModelKind::DecisionTree,
        ModelKind::RandomForest,
        ModelKind::KNearestNeighbors,
        ModelKind::LogisticRegression,
        ModelKind::KernelSvm,
        ModelKind::NaiveBayes,
        ModelKind::NeuralNetwork,
        ModelKind::GradientBoosting,
    ];

    /// Identifier used in configuration files
    pub fn id(&self) -> &'static str {
        match self {
            Self::LinearSvm => "svmlin",
            Self::DecisionTree => "dtree",
            Self::RandomForest => "rf",
            Self::KNearestNeighbors => "knn",
            Self::LogisticRegression => "logistc_reg",
            Self::KernelSvm => "svm",
            Self::NaiveBayes => "nb",
            Self::NeuralNetwork => "mlp",
            Self::GradientBoosting => "xgb",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.id() == s)
            .copied()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "classifier".to_string(),
                value: s.to_string(),
            })
    }
}

/// Results database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL host
    pub host: String,

    /// PostgreSQL port
    pub port: u16,

    /// PostgreSQL user
    pub user: String,

    /// Database name
    pub name: String,

    /// PostgreSQL password
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            name: String::new(),
            password: String::new(),
        }
    }
}

// ============================================================================
// Embedding Run Configuration
// ============================================================================

/// Configuration of a key-value embedding training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Number of passes over all records
    pub epochs: usize,

    /// Embedding dimensionality
    pub embedding_dim: usize,

    /// Training pairs per batch (two per record)
    pub batch_size: usize,

    /// Size of the value vocabulary including the UNK slot
    pub num_values: usize,

    /// Gradient descent step size
    pub learning_rate: f32,

    /// Seed for weight initialization
    pub seed: u64,

    /// Records held out from training for loss reporting (0 = none)
    pub validation_records: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            embedding_dim: 128,
            batch_size: 1000,
            num_values: 1000,
            learning_rate: 1.0,
            seed: DEFAULT_SEED,
            validation_records: 0,
        }
    }
}

impl EmbeddingConfig {
    pub fn new(epochs: usize, embedding_dim: usize) -> Self {
        Self {
            epochs,
            embedding_dim,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_validation_records(mut self, n: usize) -> Self {
        self.validation_records = n;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_num_values(mut self, num_values: usize) -> Self {
        self.num_values = num_values;
        self
    }

    /// Records contributing to one batch
    pub fn records_per_batch(&self) -> usize {
        self.batch_size / 2
    }

    /// Check the values a training run relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dim == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding_dim".to_string(),
                value: "0".to_string(),
            });
        }
        if self.batch_size < 2 || self.batch_size % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".to_string(),
                value: self.batch_size.to_string(),
            });
        }
        if self.num_values == 0 {
            return Err(ConfigError::InvalidValue {
                key: "num_values".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Load `LOG_LEVEL` and `LOG_FORMAT`, keeping the defaults otherwise
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; `LOG_FORMAT=json` selects JSON lines
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.json_format = format.trim().eq_ignore_ascii_case("json");
        }
        config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let config = ClassifierConfig::parse_str(
            "classifier=rf\ndebug=false\ndbHost=db.example\ndbUser=osm\ndbName=links\ndbPassword=secret\n",
        )
        .unwrap();

        assert_eq!(config.model, ModelKind::RandomForest);
        assert!(!config.debug);
        assert_eq!(config.database.host, "db.example");
        assert_eq!(config.database.user, "osm");
        assert_eq!(config.database.name, "links");
        assert_eq!(config.database.password, "secret");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.workers, None);
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let clean = ClassifierConfig::parse_str("classifier=nb\ndebug=true\ndbHost=h\n").unwrap();
        let noisy = ClassifierConfig::parse_str(
            "# comment\nclassifier=nb\n\ndbHost=a=b\ndebug=true\nno separator\ndbHost=h\n=\n",
        )
        .unwrap();

        assert_eq!(clean.model, noisy.model);
        assert_eq!(clean.debug, noisy.debug);
        assert_eq!(clean.database.host, noisy.database.host);
    }

    #[test]
    fn test_debug_defaults_to_true() {
        let config = ClassifierConfig::parse_str("classifier=dtree").unwrap();
        assert!(config.debug);

        let config = ClassifierConfig::parse_str("classifier=dtree\ndebug=TRUE").unwrap();
        assert!(!config.debug);
    }

    #[test]
    fn test_last_classifier_wins() {
        let config = ClassifierConfig::parse_str("classifier=svm,knn,xgb").unwrap();
        assert_eq!(config.model, ModelKind::GradientBoosting);

        let config = ClassifierConfig::parse_str("classifier=svm\nclassifier=mlp").unwrap();
        assert_eq!(config.model, ModelKind::NeuralNetwork);
    }

    #[test]
    fn test_unknown_classifier_fails() {
        let err = ClassifierConfig::parse_str("classifier=svm,boost").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref value, .. } if value == "boost"));

        assert!(ClassifierConfig::parse_str("classifier=").is_err());
    }

    #[test]
    fn test_missing_classifier_fails() {
        let err = ClassifierConfig::parse_str("debug=true").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));
    }

    #[test]
    fn test_seed_and_workers() {
        let config =
            ClassifierConfig::parse_str("classifier=knn\nseed=17\nworkers=3\ndbPort=6543").unwrap();
        assert_eq!(config.seed, 17);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.database.port, 6543);

        assert!(ClassifierConfig::parse_str("classifier=knn\nworkers=0").is_err());
        assert!(ClassifierConfig::parse_str("classifier=knn\nseed=abc").is_err());
    }

    #[test]
    fn test_model_kind_ids_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.id().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!(
            "logistc_reg".parse::<ModelKind>().unwrap(),
            ModelKind::LogisticRegression
        );
    }

    #[test]
    fn test_env_override() {
        let config = ClassifierConfig::parse_str("classifier=nb\ndbPassword=file").unwrap();
        let config = config
            .with_overrides(|key| match key {
                "DB_PASSWORD" => Some("env".to_string()),
                "DB_PORT" => Some("7000".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.database.password, "env");
        assert_eq!(config.database.port, 7000);
        assert_eq!(config.database.host, "localhost");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "classifier=logistc_reg").unwrap();
        writeln!(file, "debug=false").unwrap();

        let config = ClassifierConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model, ModelKind::LogisticRegression);
        assert!(!config.debug);

        let missing = ClassifierConfig::from_file("/nonexistent/osm2kg.conf");
        assert!(matches!(missing, Err(ConfigError::FileReadError { .. })));
    }

    #[test]
    fn test_logging_from_lookup() {
        let config = LoggingConfig::from_lookup(|_| None);
        assert_eq!(config.level, "info");
        assert!(!config.json_format);

        let config = LoggingConfig::from_lookup(|key| match key {
            "LOG_LEVEL" => Some("debug".to_string()),
            "LOG_FORMAT" => Some("JSON".to_string()),
            _ => None,
        });
        assert_eq!(config.level, "debug");
        assert!(config.json_format);

        let config = LoggingConfig::from_lookup(|key| (key == "LOG_FORMAT").then(|| "text".to_string()));
        assert!(!config.json_format);
    }

    #[test]
    fn test_embedding_config_validation() {
        assert!(EmbeddingConfig::new(1, 4).validate().is_ok());
        assert!(EmbeddingConfig::new(1, 0).validate().is_err());
        assert!(EmbeddingConfig::new(1, 4).with_batch_size(7).validate().is_err());
        assert_eq!(EmbeddingConfig::default().records_per_batch(), 500);
    }
}
