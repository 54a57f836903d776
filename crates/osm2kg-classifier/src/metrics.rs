//! Classification quality metrics
//!
//! Provides the confusion matrix and the per-class, micro and macro averaged
//! precision, recall and F1 scores persisted for every run.

use osm2kg_core::Label;
use serde::{Deserialize, Serialize};

// ============================================================================
// Confusion Matrix
// ============================================================================

/// Counts of (truth, prediction) pairs over [`Label::ALL`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Rows are ground truth, columns are predictions
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[Label], predicted: &[Label]) -> Self {
        let mut counts = [[0; 2]; 2];
        for (t, p) in truth.iter().zip(predicted) {
            counts[t.index()][p.index()] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, label: Label) -> usize {
        self.counts[label.index()][label.index()]
    }

    pub fn false_positives(&self, label: Label) -> usize {
        let c = label.index();
        (0..2).filter(|r| *r != c).map(|r| self.counts[r][c]).sum()
    }

    pub fn false_negatives(&self, label: Label) -> usize {
        let r = label.index();
        (0..2).filter(|c| *c != r).map(|c| self.counts[r][c]).sum()
    }

    /// Bracketed text layout with right-aligned counts, e.g. `[[5 0]\n [1 4]]`
    pub fn to_text(&self) -> String {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);

        let rows: Vec<String> = self
            .counts
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| format!("{c:>width$}")).collect();
                format!("[{}]", cells.join(" "))
            })
            .collect();

        format!("[{}]", rows.join("\n "))
    }
}

// ============================================================================
// Classification Report
// ============================================================================

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Precision, recall and F1 for one score family
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Full evaluation of a set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Indexed like [`Label::ALL`]
    pub per_class: [Scores; 2],
    pub micro: Scores,
    pub macro_avg: Scores,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn new(truth: &[Label], predicted: &[Label]) -> Self {
        let confusion = ConfusionMatrix::from_labels(truth, predicted);

        let per_class = Label::ALL.map(|label| {
            let tp = confusion.true_positives(label);
            let precision = ratio(tp, tp + confusion.false_positives(label));
            let recall = ratio(tp, tp + confusion.false_negatives(label));
            Scores {
                precision,
                recall,
                f1: f1(precision, recall),
            }
        });

        let (tp, fp, fn_) = Label::ALL.iter().fold((0, 0, 0), |(tp, fp, fn_), label| {
            (
                tp + confusion.true_positives(*label),
                fp + confusion.false_positives(*label),
                fn_ + confusion.false_negatives(*label),
            )
        });
        let micro_precision = ratio(tp, tp + fp);
        let micro_recall = ratio(tp, tp + fn_);
        let micro = Scores {
            precision: micro_precision,
            recall: micro_recall,
            f1: f1(micro_precision, micro_recall),
        };

        let n = per_class.len() as f64;
        let macro_avg = Scores {
            precision: per_class.iter().map(|s| s.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|s| s.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|s| s.f1).sum::<f64>() / n,
        };

        let accuracy = ratio(
            Label::ALL.iter().map(|l| confusion.true_positives(*l)).sum(),
            confusion.total(),
        );

        Self {
            per_class,
            micro,
            macro_avg,
            accuracy,
            confusion,
        }
    }

    pub fn class(&self, label: Label) -> &Scores {
        &self.per_class[label.index()]
    }
}

/// Macro-averaged F1, the search objective
pub fn f1_macro(truth: &[Label], predicted: &[Label]) -> f64 {
    ClassificationReport::new(truth, predicted).macro_avg.f1
}
