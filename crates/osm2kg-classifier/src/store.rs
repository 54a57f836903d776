//! Classification results store
//!
//! One row per (experiment, fold, classifier) is written to the
//! `osmlinks.classification_results` PostgreSQL table inside a transaction
//! that stays open until the prediction file has been written.

use async_trait::async_trait;
use osm2kg_core::{DatabaseConfig, Osm2kgError, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::metrics::ClassificationReport;

const INSERT_RESULT: &str = r#"
    INSERT INTO osmlinks.classification_results VALUES (
        $1, $2, $3,
        $4, $5, $6, $7,
        $8, $9, $10, $11,
        $12, $13, $14, $15,
        $16, $17
    )
"#;

/// One results table row, in column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub experiment_id: i32,
    pub fold: i32,
    pub classifier: String,
    pub precision_correct: f64,
    pub precision_incorrect: f64,
    pub precision_micro: f64,
    pub precision_macro: f64,
    pub recall_correct: f64,
    pub recall_incorrect: f64,
    pub recall_micro: f64,
    pub recall_macro: f64,
    pub f1_correct: f64,
    pub f1_incorrect: f64,
    pub f1_micro: f64,
    pub f1_macro: f64,
    pub accuracy: f64,
    pub confusion_matrix: String,
}

impl ClassificationResult {
    pub fn new(
        experiment_id: i32,
        fold: i32,
        classifier: impl Into<String>,
        report: &ClassificationReport,
    ) -> Self {
        let [correct, incorrect] = report.per_class;
        Self {
            experiment_id,
            fold,
            classifier: classifier.into(),
            precision_correct: correct.precision,
            precision_incorrect: incorrect.precision,
            precision_micro: report.micro.precision,
            precision_macro: report.macro_avg.precision,
            recall_correct: correct.recall,
            recall_incorrect: incorrect.recall,
            recall_micro: report.micro.recall,
            recall_macro: report.macro_avg.recall,
            f1_correct: correct.f1,
            f1_incorrect: incorrect.f1,
            f1_micro: report.micro.f1,
            f1_macro: report.macro_avg.f1,
            accuracy: report.accuracy,
            confusion_matrix: report.confusion.to_text(),
        }
    }
}

/// Results repository trait
#[async_trait]
pub trait ResultsRepository: Send {
    /// Stage one result row
    async fn insert_result(&mut self, result: &ClassificationResult) -> Result<()>;

    /// Make staged rows durable and release the connection
    async fn commit(&mut self) -> Result<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL results store holding a single connection and transaction
pub struct PgResultsStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgResultsStore {
    /// Connect and begin the run's transaction
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port);
        if !config.user.is_empty() {
            options = options.username(&config.user);
        }
        if !config.name.is_empty() {
            options = options.database(&config.name);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Osm2kgError::Database(format!("PostgreSQL connection failed: {e}")))?;

        let tx = pool
            .begin()
            .await
            .map_err(|e| Osm2kgError::Database(format!("Failed to begin transaction: {e}")))?;

        tracing::info!(host = %config.host, database = %config.name, "connected to results database");
        Ok(Self { pool, tx: Some(tx) })
    }
}

#[async_trait]
impl ResultsRepository for PgResultsStore {
    async fn insert_result(&mut self, result: &ClassificationResult) -> Result<()> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| Osm2kgError::Database("transaction already committed".to_string()))?;

        sqlx::query(INSERT_RESULT)
            .bind(result.experiment_id)
            .bind(result.fold)
            .bind(&result.classifier)
            .bind(result.precision_correct)
            .bind(result.precision_incorrect)
            .bind(result.precision_micro)
            .bind(result.precision_macro)
            .bind(result.recall_correct)
            .bind(result.recall_incorrect)
            .bind(result.recall_micro)
            .bind(result.recall_macro)
            .bind(result.f1_correct)
            .bind(result.f1_incorrect)
            .bind(result.f1_micro)
            .bind(result.f1_macro)
            .bind(result.accuracy)
            .bind(&result.confusion_matrix)
            .execute(&mut **tx)
            .await
            .map_err(|e| Osm2kgError::Database(format!("Failed to insert result: {e}")))?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .map_err(|e| Osm2kgError::Database(format!("Failed to commit: {e}")))?;
        }
        self.pool.close().await;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Results kept in memory, for runs without a database
#[derive(Debug, Default)]
pub struct InMemoryResults {
    pending: Vec<ClassificationResult>,
    committed: Vec<ClassificationResult>,
}

impl InMemoryResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows made durable by [`ResultsRepository::commit`]
    pub fn committed(&self) -> &[ClassificationResult] {
        &self.committed
    }

    pub fn pending(&self) -> &[ClassificationResult] {
        &self.pending
    }
}

#[async_trait]
impl ResultsRepository for InMemoryResults {
    async fn insert_result(&mut self, result: &ClassificationResult) -> Result<()> {
        self.pending.push(result.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.committed.append(&mut self.pending);
        Ok(())
    }
}
