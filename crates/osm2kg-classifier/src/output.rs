//! Prediction file writer
//!
//! The calling linking process reads `<test file>_pred`: one tab-separated
//! line per test row with the OSM id, KG id, predicted label and the
//! probabilities of `correct` and `incorrect`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use osm2kg_core::{Label, Osm2kgError, Result};

/// One output line
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub osm_id: String,
    pub kg_id: String,
    pub predicted: Label,
    pub p_correct: f64,
    pub p_incorrect: f64,
}

/// Prediction file path for a test file
pub fn prediction_path(test_path: &Path) -> PathBuf {
    let mut path = test_path.as_os_str().to_owned();
    path.push("_pred");
    PathBuf::from(path)
}

/// Pair predictions with the probability columns of `correct` and `incorrect`
///
/// `classes` is the column order of `proba` as reported by the fitted model.
pub fn prediction_records(
    osm_ids: &[String],
    kg_ids: &[String],
    predicted: &[Label],
    proba: ArrayView2<'_, f64>,
    classes: &[Label],
) -> Result<Vec<PredictionRecord>> {
    let column = |label: Label| {
        classes.iter().position(|c| *c == label).ok_or_else(|| {
            Osm2kgError::Training(format!("fitted model does not report class '{label}'"))
        })
    };
    let correct = column(Label::Correct)?;
    let incorrect = column(Label::Incorrect)?;

    let n = predicted.len();
    if osm_ids.len() != n || kg_ids.len() != n || proba.nrows() != n {
        return Err(Osm2kgError::InvalidData(format!(
            "{n} predictions for {} ids and {} probability rows",
            osm_ids.len(),
            proba.nrows()
        )));
    }

    Ok((0..n)
        .map(|i| PredictionRecord {
            osm_id: osm_ids[i].clone(),
            kg_id: kg_ids[i].clone(),
            predicted: predicted[i],
            p_correct: proba[[i, correct]],
            p_incorrect: proba[[i, incorrect]],
        })
        .collect())
}

/// Write the records, replacing any previous file
pub fn write_predictions(path: &Path, records: &[PredictionRecord]) -> Result<()> {
    let io_error = |e: std::io::Error| Osm2kgError::io(path, e);
    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            r.osm_id, r.kg_id, r.predicted, r.p_correct, r.p_incorrect
        )
        .map_err(io_error)?;
    }
    out.flush().map_err(io_error)?;

    tracing::info!(path = %path.display(), rows = records.len(), "wrote predictions");
    Ok(())
}
