//! Link classification pipeline
//!
//! Load → balance → standardize → fit → evaluate → store → write predictions.
//! The results repository is expected to hold an open transaction; it is
//! committed only after the prediction file exists.

use std::path::PathBuf;

use osm2kg_core::{ClassifierConfig, Osm2kgError, Result};

use crate::data::LabeledData;
use crate::metrics::ClassificationReport;
use crate::models::{create_model, ParamSet};
use crate::output::{prediction_path, prediction_records, write_predictions};
use crate::preprocessing::StandardScaler;
use crate::search::Optimizer;
use crate::smote::Smote;
use crate::store::{ClassificationResult, ResultsRepository};

/// Inputs identifying one cross-validation fold of an experiment
#[derive(Debug, Clone)]
pub struct ClassificationJob {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub experiment_id: i32,
    pub fold: i32,
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub classifier: &'static str,
    pub params: ParamSet,
    pub report: ClassificationReport,
    pub prediction_path: PathBuf,
}

impl ClassificationOutcome {
    pub fn f1_macro(&self) -> f64 {
        self.report.macro_avg.f1
    }

    /// Chosen hyperparameters as a JSON object
    pub fn params_json(&self) -> String {
        let params: serde_json::Map<String, serde_json::Value> = self
            .params
            .iter()
            .map(|(name, value)| {
                let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                (name.to_string(), value)
            })
            .collect();
        serde_json::Value::Object(params).to_string()
    }
}

/// Run one classification job end to end
pub async fn run_classification<R: ResultsRepository>(
    job: &ClassificationJob,
    config: &ClassifierConfig,
    repo: &mut R,
) -> Result<ClassificationOutcome> {
    let train = LabeledData::load(&job.train_path)?;
    let test = LabeledData::load(&job.test_path)?;
    if train.n_features() != test.n_features() {
        return Err(Osm2kgError::InvalidData(format!(
            "training data has {} features, test data has {}",
            train.n_features(),
            test.n_features()
        )));
    }
    tracing::info!(
        train_rows = train.len(),
        test_rows = test.len(),
        features = train.n_features(),
        "loaded data"
    );

    let (train_x, train_y) =
        Smote::new(config.seed).fit_resample(train.features.view(), &train.labels)?;
    let scaler = StandardScaler::fit(train_x.view())?;
    let train_x = scaler.transform(train_x.view())?;
    let test_x = scaler.transform(test.features.view())?;

    let spec = create_model(config.model, config.seed);
    let optimizer = Optimizer::new(config.workers.unwrap_or(1), config.seed);
    let debug = config.debug;

    tracing::info!(model = %config.model, debug = config.debug, "fitting");
    let outcome = tokio::task::spawn_blocking(move || {
        optimizer.fit(spec, train_x.view(), &train_y, debug)
    })
    .await
    .map_err(|e| Osm2kgError::Training(format!("fitting task failed: {e}")))??;
    let model = outcome.model;

    tracing::info!("evaluating");
    let predicted = model.predict(test_x.view())?;
    let report = ClassificationReport::new(&test.labels, &predicted);

    tracing::info!(
        f1_macro = report.macro_avg.f1,
        accuracy = report.accuracy,
        "scoring"
    );
    let row = ClassificationResult::new(job.experiment_id, job.fold, model.name(), &report);
    repo.insert_result(&row).await?;

    tracing::info!("computing probabilities");
    let proba = model.predict_proba(test_x.view())?;
    let records = prediction_records(
        &test.osm_ids,
        &test.kg_ids,
        &predicted,
        proba.view(),
        model.classes(),
    )?;

    let path = prediction_path(&job.test_path);
    tracing::info!(path = %path.display(), "writing output");
    write_predictions(&path, &records)?;

    repo.commit().await?;

    Ok(ClassificationOutcome {
        classifier: model.name(),
        params: outcome.params,
        report,
        prediction_path: path,
    })
}
