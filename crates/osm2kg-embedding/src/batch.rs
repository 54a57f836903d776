//! Training batch generation
//!
//! Every record contributes two consecutive training pairs: the entity with
//! its key, then the entity with its value. Value targets are shifted past the
//! key codes so both live in one output space.

use crate::vocab::EncodedRecord;

/// Inputs (entity codes) and softmax targets of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub inputs: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Deterministic slicing of records into batches
#[derive(Debug, Clone, Copy)]
pub struct BatchGenerator<'a> {
    records: &'a [EncodedRecord],
    records_per_batch: usize,
    num_keys: usize,
}

impl<'a> BatchGenerator<'a> {
    /// `records_per_batch` is half the nominal batch size and must be positive
    pub fn new(records: &'a [EncodedRecord], records_per_batch: usize, num_keys: usize) -> Self {
        Self {
            records,
            records_per_batch: records_per_batch.max(1),
            num_keys,
        }
    }

    /// Batches per epoch, `ceil(records / records_per_batch)`
    pub fn num_batches(&self) -> usize {
        self.records.len().div_ceil(self.records_per_batch)
    }

    /// The batch at `index`; past the last batch it is empty
    pub fn batch(&self, index: usize) -> Batch {
        let start = (index * self.records_per_batch).min(self.records.len());
        let end = (start + self.records_per_batch).min(self.records.len());
        let chunk = &self.records[start..end];

        let mut batch = Batch {
            inputs: Vec::with_capacity(chunk.len() * 2),
            targets: Vec::with_capacity(chunk.len() * 2),
        };
        for record in chunk {
            batch.inputs.push(record.entity);
            batch.targets.push(record.key);
            batch.inputs.push(record.entity);
            batch.targets.push(self.num_keys + record.value);
        }
        batch
    }

    pub fn iter(&self) -> impl Iterator<Item = Batch> + '_ {
        (0..self.num_batches()).map(|index| self.batch(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<EncodedRecord> {
        (0..n)
            .map(|i| EncodedRecord {
                entity: i % 7,
                key: i % 3,
                value: i % 5,
            })
            .collect()
    }

    #[test]
    fn test_batch_count_rounds_up() {
        let data = records(1001);
        let generator = BatchGenerator::new(&data, 500, 3);
        assert_eq!(generator.num_batches(), 3);
        assert_eq!(generator.batch(0).len(), 1000);
        assert_eq!(generator.batch(2).len(), 2);

        let exact = records(1000);
        assert_eq!(BatchGenerator::new(&exact, 500, 3).num_batches(), 2);
    }

    #[test]
    fn test_pairs_alternate_key_then_value() {
        let data = records(4);
        let batch = BatchGenerator::new(&data, 500, 3).batch(0);
        assert_eq!(batch.inputs, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(batch.targets, vec![0, 3, 1, 4, 2, 5, 0, 6]);
    }

    #[test]
    fn test_last_batch_covers_the_tail() {
        let data = records(7);
        let generator = BatchGenerator::new(&data, 3, 3);
        let last = generator.batch(2);
        assert_eq!(last.inputs, vec![6, 6]);
        assert!(generator.batch(3).is_empty());
    }

    #[test]
    fn test_empty_records() {
        let generator = BatchGenerator::new(&[], 500, 0);
        assert_eq!(generator.num_batches(), 0);
        assert_eq!(generator.iter().count(), 0);
    }
}
