//! Vocabulary encoding of tag data
//!
//! Entity ids and keys receive dense codes in order of first occurrence. The
//! value vocabulary is capped: code 0 is the UNK marker and the remaining
//! slots go to the most frequent values (ties broken by first occurrence).
//! Every other value is encoded as UNK.

use std::collections::HashMap;

use osm2kg_core::{Osm2kgError, Result};

use crate::tags::TagData;

/// Marker of values outside the vocabulary
pub const UNK: &str = "UNK";

/// One encoded tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedRecord {
    pub entity: usize,
    pub key: usize,
    pub value: usize,
}

/// Code tables produced by [`encode`]
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Entity code → original id
    entity_ids: Vec<String>,
    keys: HashMap<String, usize>,
    values: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn num_entities(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Width of the softmax output: keys first, then values
    pub fn output_size(&self) -> usize {
        self.num_keys() + self.num_values()
    }

    pub fn entity_id(&self, code: usize) -> Option<&str> {
        self.entity_ids.get(code).map(String::as_str)
    }

    /// Original ids indexed by entity code
    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn key_code(&self, key: &str) -> Option<usize> {
        self.keys.get(key).copied()
    }

    /// Code of a value, UNK when it is outside the vocabulary
    pub fn value_code(&self, value: &str) -> usize {
        self.values.get(value).copied().unwrap_or(0)
    }
}

/// Encoded records together with their vocabulary
#[derive(Debug, Clone)]
pub struct EncodedTags {
    pub records: Vec<EncodedRecord>,
    pub vocab: Vocabulary,
}

/// The `limit` most frequent values, ties in order of first occurrence
fn most_common<'a>(values: &'a [String], limit: usize) -> Vec<&'a str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in values.iter().enumerate() {
        counts.entry(value.as_str()).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(value, (count, first))| (value, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(value, _, _)| value).collect()
}

/// Encode tag data with a value vocabulary of `num_values` slots (UNK included)
pub fn encode(data: &TagData, num_values: usize) -> Result<EncodedTags> {
    if num_values == 0 {
        return Err(Osm2kgError::Config(
            "value vocabulary needs at least the UNK slot".to_string(),
        ));
    }

    tracing::info!("determining most common values");
    let mut vocab = Vocabulary::default();
    vocab.values.insert(UNK.to_string(), 0);
    for value in most_common(&data.values, num_values - 1) {
        let next = vocab.values.len();
        vocab.values.entry(value.to_string()).or_insert(next);
    }

    tracing::info!("encoding records");
    let mut entities: HashMap<&str, usize> = HashMap::new();
    let mut records = Vec::with_capacity(data.len());
    for ((id, key), value) in data.ids.iter().zip(&data.keys).zip(&data.values) {
        let entity = *entities.entry(id.as_str()).or_insert_with(|| {
            vocab.entity_ids.push(id.clone());
            vocab.entity_ids.len() - 1
        });
        let next_key = vocab.keys.len();
        let key = *vocab.keys.entry(key.clone()).or_insert(next_key);
        let value = vocab.value_code(value);
        records.push(EncodedRecord { entity, key, value });
    }

    tracing::info!(
        ids = vocab.num_entities(),
        keys = vocab.num_keys(),
        values = vocab.num_values(),
        "vocabulary sizes"
    );
    Ok(EncodedTags { records, vocab })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(rows: &[(&str, &str, &str)]) -> TagData {
        let mut data = TagData::default();
        for (id, key, value) in rows {
            data.push(*id, *key, *value);
        }
        data
    }

    #[test]
    fn test_codes_follow_first_occurrence() {
        let data = tags(&[
            ("n2", "shop", "bakery"),
            ("n1", "name", "Hof"),
            ("n2", "name", "Hof"),
        ]);
        let encoded = encode(&data, 10).unwrap();

        assert_eq!(encoded.vocab.entity_ids(), &["n2".to_string(), "n1".to_string()]);
        assert_eq!(encoded.vocab.key_code("shop"), Some(0));
        assert_eq!(encoded.vocab.key_code("name"), Some(1));
        // Hof is more frequent than bakery
        assert_eq!(encoded.vocab.value_code("Hof"), 1);
        assert_eq!(encoded.vocab.value_code("bakery"), 2);
        assert_eq!(
            encoded.records,
            vec![
                EncodedRecord { entity: 0, key: 0, value: 2 },
                EncodedRecord { entity: 1, key: 1, value: 1 },
                EncodedRecord { entity: 0, key: 1, value: 1 },
            ]
        );
    }

    #[test]
    fn test_frequency_ties_keep_first_occurrence() {
        let data = tags(&[("a", "k", "z"), ("b", "k", "y"), ("c", "k", "x"), ("d", "k", "y")]);
        let ranked = most_common(&data.values, 3);
        assert_eq!(ranked, vec!["y", "z", "x"]);
    }

    #[test]
    fn test_values_outside_vocabulary_become_unk() {
        let data = tags(&[("a", "k", "v1"), ("a", "k", "v1"), ("b", "k", "v2"), ("c", "k", "v3")]);
        let encoded = encode(&data, 2).unwrap();

        assert_eq!(encoded.vocab.num_values(), 2);
        let values: Vec<usize> = encoded.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_literal_unk_shares_slot_zero() {
        let data = tags(&[("a", "k", "UNK"), ("b", "k", "UNK"), ("c", "k", "x")]);
        let encoded = encode(&data, 5).unwrap();

        assert_eq!(encoded.vocab.value_code("UNK"), 0);
        assert_eq!(encoded.vocab.value_code("x"), 1);
        assert_eq!(encoded.vocab.num_values(), 2);
    }

    #[test]
    fn test_rare_value_collapses_in_large_dataset() {
        let mut data = TagData::default();
        for i in 0..1999 {
            data.push(format!("n{i}"), "name", format!("common{}", i % 999));
        }
        data.push("rare_node", "name", "only_once");
        assert_eq!(data.len(), 2000);

        let encoded = encode(&data, 1000).unwrap();
        assert_eq!(encoded.vocab.num_values(), 1000);
        assert_eq!(encoded.records.len(), 2000);
        assert_eq!(encoded.records[1999].value, 0);
        assert!(encoded.records[..1999].iter().all(|r| r.value != 0));
    }

    #[test]
    fn test_zero_vocabulary_is_rejected() {
        assert!(encode(&TagData::default(), 0).is_err());
    }
}
