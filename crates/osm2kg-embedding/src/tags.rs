//! Tag data loader
//!
//! Each line holds an entity id, a tag key and the tag value separated by
//! tabs. Values may themselves contain tabs; every field after the key is
//! rejoined with single spaces.

use std::path::Path;

use osm2kg_core::{Osm2kgError, Result};

/// Column-oriented tag rows in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagData {
    pub ids: Vec<String>,
    pub keys: Vec<String>,
    pub values: Vec<String>,
}

impl TagData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Osm2kgError::io(path, e))?;
        Self::parse(path, &content)
    }

    /// Parse tag file contents; `path` only labels errors
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut data = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split('\t');
            let (Some(id), Some(key)) = (fields.next(), fields.next()) else {
                return Err(Osm2kgError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: "expected id and key separated by a tab".to_string(),
                });
            };
            let value = fields.collect::<Vec<_>>().join(" ");

            data.ids.push(id.to_string());
            data.keys.push(key.to_string());
            data.values.push(value);
        }

        tracing::debug!(path = %path.display(), rows = data.len(), "parsed tag data");
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
        self.ids.push(id.into());
        self.keys.push(key.into());
        self.values.push(value.into());
    }
}
