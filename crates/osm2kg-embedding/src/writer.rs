//! Embedding file writer
//!
//! One line per entity: the original id followed by the vector components,
//! all separated by single spaces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use osm2kg_core::{Osm2kgError, Result};

use crate::train::EmbeddingTable;

/// `<out_dir>/<basename(input)>_embeddings_<dim>_<epochs>`
pub fn embedding_path(out_dir: &Path, input: &Path, dim: usize, epochs: usize) -> PathBuf {
    let base = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    out_dir.join(format!("{base}_embeddings_{dim}_{epochs}"))
}

/// Write the table, replacing any previous file
pub fn write_embeddings(path: &Path, table: &EmbeddingTable) -> Result<()> {
    let io_error = |e: std::io::Error| Osm2kgError::io(path, e);
    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
    for (id, vector) in table.ids.iter().zip(table.vectors.rows()) {
        out.write_all(id.as_bytes()).map_err(io_error)?;
        for component in vector {
            write!(out, " {component}").map_err(io_error)?;
        }
        writeln!(out).map_err(io_error)?;
    }
    out.flush().map_err(io_error)?;

    tracing::info!(path = %path.display(), entities = table.len(), "wrote embeddings");
    Ok(())
}

/// Read a file produced by [`write_embeddings`]
pub fn read_embeddings(path: &Path) -> Result<EmbeddingTable> {
    let content = std::fs::read_to_string(path).map_err(|e| Osm2kgError::io(path, e))?;

    let mut ids = Vec::new();
    let mut components = Vec::new();
    let mut dim = None;
    for (index, line) in content.lines().enumerate() {
        let parse_error = |message: String| Osm2kgError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };
        let mut tokens = line.split(' ');
        let Some(id) = tokens.next().filter(|id| !id.is_empty()) else {
            continue;
        };

        let vector = tokens
            .map(|t| t.parse::<f32>().map_err(|e| parse_error(format!("component '{t}': {e}"))))
            .collect::<Result<Vec<_>>>()?;
        match dim {
            None => dim = Some(vector.len()),
            Some(expected) if expected != vector.len() => {
                return Err(parse_error(format!(
                    "expected {expected} components, found {}",
                    vector.len()
                )));
            }
            Some(_) => {}
        }
        ids.push(id.to_string());
        components.extend(vector);
    }

    let vectors = Array2::from_shape_vec((ids.len(), dim.unwrap_or(0)), components)
        .map_err(|e| Osm2kgError::InvalidData(format!("embedding table shape: {e}")))?;
    Ok(EmbeddingTable { ids, vectors })
}
