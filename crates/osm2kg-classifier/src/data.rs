//! Labeled link candidate loader
//!
//! Training and test files are tab-separated without a header. Every row
//! holds the OSM node id, the KG entity id, the `correct` / `incorrect`
//! label and then the numeric feature block.

use std::path::Path;

use ndarray::Array2;
use osm2kg_core::{Label, Osm2kgError, Result};

/// Columns preceding the feature block
const ID_COLUMNS: usize = 3;

/// Row-aligned features, labels and candidate identifiers of one data file
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub features: Array2<f64>,
    pub labels: Vec<Label>,
    pub osm_ids: Vec<String>,
    pub kg_ids: Vec<String>,
}

impl LabeledData {
    /// Read and parse a data file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Osm2kgError::io(path, e))?;
        Self::parse(path, &content)
    }

    /// Parse data file contents; `path` only labels errors
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let parse_error = |line: usize, message: String| Osm2kgError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut width: Option<usize> = None;
        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut osm_ids = Vec::new();
        let mut kg_ids = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let columns: Vec<&str> = line.split('\t').collect();
            match width {
                None if columns.len() <= ID_COLUMNS => {
                    return Err(parse_error(
                        line_no,
                        format!(
                            "expected ids, label and at least one feature, found {} columns",
                            columns.len()
                        ),
                    ));
                }
                None => width = Some(columns.len()),
                Some(expected) if expected != columns.len() => {
                    return Err(parse_error(
                        line_no,
                        format!("expected {expected} columns, found {}", columns.len()),
                    ));
                }
                Some(_) => {}
            }

            let label: Label = columns[2]
                .parse()
                .map_err(|e: Osm2kgError| parse_error(line_no, e.to_string()))?;

            for raw in &columns[ID_COLUMNS..] {
                let value: f64 = raw.trim().parse().map_err(|_| {
                    parse_error(line_no, format!("feature '{raw}' is not a number"))
                })?;
                values.push(value);
            }

            osm_ids.push(columns[0].to_string());
            kg_ids.push(columns[1].to_string());
            labels.push(label);
        }

        let Some(width) = width else {
            return Err(Osm2kgError::InvalidData(format!(
                "{} contains no data rows",
                path.display()
            )));
        };

        let features = Array2::from_shape_vec((labels.len(), width - ID_COLUMNS), values)
            .map_err(|e| Osm2kgError::InvalidData(format!("feature matrix: {e}")))?;

        tracing::debug!(
            path = %path.display(),
            rows = labels.len(),
            features = features.ncols(),
            "loaded labeled data"
        );

        Ok(Self {
            features,
            labels,
            osm_ids,
            kg_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}
