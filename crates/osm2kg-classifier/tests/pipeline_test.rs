//! End-to-end runs of the classification pipeline against temporary files

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use osm2kg_classifier::{run_classification, ClassificationJob, InMemoryResults};
use osm2kg_core::{ClassifierConfig, ModelKind, Osm2kgError};

/// Balanced rows with two features; correct rows cluster below the origin
fn write_dataset(path: &Path, n_per_class: usize, offset: usize) {
    let mut content = String::new();
    for i in 0..n_per_class {
        let jitter = ((i + offset) as f64 * 0.73).sin();
        writeln!(
            content,
            "node{}\tQ{}\tcorrect\t{}\t{}",
            2 * i,
            2 * i,
            -1.0 + 0.6 * jitter,
            -0.8 - 0.4 * jitter
        )
        .unwrap();
        writeln!(
            content,
            "node{}\tQ{}\tincorrect\t{}\t{}",
            2 * i + 1,
            2 * i + 1,
            1.0 - 0.5 * jitter,
            0.9 + 0.3 * jitter
        )
        .unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn job(dir: &Path) -> ClassificationJob {
    let train_path = dir.join("train.tsv");
    let test_path = dir.join("test.tsv");
    write_dataset(&train_path, 50, 0);
    write_dataset(&test_path, 5, 100);
    ClassificationJob {
        train_path,
        test_path,
        experiment_id: 7,
        fold: 2,
    }
}

fn read_predictions(path: &PathBuf) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn test_naive_bayes_debug_run_writes_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path());
    let config = ClassifierConfig::parse_str("classifier=nb\ndebug=true\n").unwrap();
    let mut repo = InMemoryResults::new();

    let outcome = run_classification(&job, &config, &mut repo).await.unwrap();

    assert_eq!(outcome.prediction_path, dir.path().join("test.tsv_pred"));
    let lines = read_predictions(&outcome.prediction_path);
    assert_eq!(lines.len(), 10);
    for fields in &lines {
        assert_eq!(fields.len(), 5);
        assert!(fields[2] == "correct" || fields[2] == "incorrect");
        let p_correct: f64 = fields[3].parse().unwrap();
        let p_incorrect: f64 = fields[4].parse().unwrap();
        assert!((p_correct + p_incorrect - 1.0).abs() < 1e-6);
    }
    assert_eq!(lines[0][0], "node0");
    assert_eq!(lines[0][1], "Q0");

    let rows = repo.committed();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].experiment_id, 7);
    assert_eq!(rows[0].fold, 2);
    assert_eq!(rows[0].classifier, "GaussianNB");
    assert_eq!(rows[0].f1_macro, outcome.f1_macro());
    assert_eq!(rows[0].accuracy, 1.0);
}

#[tokio::test]
async fn test_search_run_is_reproducible_with_fixed_seed() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path());
    let mut config = ClassifierConfig::new(ModelKind::RandomForest);
    config.debug = false;
    config.seed = 11;
    config.workers = Some(2);

    let mut first = InMemoryResults::new();
    let a = run_classification(&job, &config, &mut first).await.unwrap();
    let predictions_a = std::fs::read_to_string(&a.prediction_path).unwrap();

    let mut second = InMemoryResults::new();
    let b = run_classification(&job, &config, &mut second).await.unwrap();
    let predictions_b = std::fs::read_to_string(&b.prediction_path).unwrap();

    assert_eq!(first.committed(), second.committed());
    assert_eq!(a.params, b.params);
    assert!(a.params_json().contains("\"n_estimators\""));
    assert_eq!(predictions_a, predictions_b);
    assert_eq!(first.committed()[0].classifier, "RandomForestClassifier");
}

#[tokio::test]
async fn test_feature_width_mismatch_is_rejected_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path());
    std::fs::write(&job.test_path, "node1\tQ1\tcorrect\t0.5\n").unwrap();

    let config = ClassifierConfig::new(ModelKind::NaiveBayes);
    let mut repo = InMemoryResults::new();
    let err = run_classification(&job, &config, &mut repo).await.unwrap_err();

    assert!(matches!(err, Osm2kgError::InvalidData(_)));
    assert!(repo.committed().is_empty());
    assert!(!dir.path().join("test.tsv_pred").exists());
}

#[tokio::test]
async fn test_missing_training_file() {
    let dir = tempfile::tempdir().unwrap();
    let job = ClassificationJob {
        train_path: dir.path().join("missing.tsv"),
        test_path: dir.path().join("test.tsv"),
        experiment_id: 1,
        fold: 1,
    };
    let config = ClassifierConfig::new(ModelKind::NaiveBayes);
    let mut repo = InMemoryResults::new();

    let err = run_classification(&job, &config, &mut repo).await.unwrap_err();
    assert!(matches!(err, Osm2kgError::Io { .. }));
}
