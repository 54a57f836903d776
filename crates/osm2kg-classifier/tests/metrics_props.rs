//! Property checks of the scoring and fold assignment

use osm2kg_classifier::metrics::ClassificationReport;
use osm2kg_classifier::search::stratified_folds;
use osm2kg_core::Label;
use proptest::prelude::*;

fn labels(max: usize) -> impl Strategy<Value = Vec<Label>> {
    prop::collection::vec(prop::sample::select(Label::ALL.to_vec()), 1..max)
}

proptest! {
    #[test]
    fn scores_stay_in_unit_interval(pairs in labels(200).prop_flat_map(|truth| {
        let n = truth.len();
        (Just(truth), prop::collection::vec(prop::sample::select(Label::ALL.to_vec()), n))
    })) {
        let (truth, predicted) = pairs;
        let report = ClassificationReport::new(&truth, &predicted);

        prop_assert_eq!(report.confusion.total(), truth.len());
        for scores in report.per_class.iter().chain([&report.micro, &report.macro_avg]) {
            prop_assert!((0.0..=1.0).contains(&scores.precision));
            prop_assert!((0.0..=1.0).contains(&scores.recall));
            prop_assert!((0.0..=1.0).contains(&scores.f1));
        }
        // every sample is either right or wrong in a binary problem
        prop_assert!((report.micro.f1 - report.accuracy).abs() < 1e-12);
    }

    #[test]
    fn folds_partition_the_samples(y in labels(120), k in 2usize..6) {
        match stratified_folds(&y, k) {
            Ok(folds) => {
                let mut seen: Vec<usize> = folds.iter().flatten().copied().collect();
                seen.sort_unstable();
                prop_assert_eq!(seen, (0..y.len()).collect::<Vec<_>>());
                for fold in &folds {
                    for label in Label::ALL {
                        prop_assert!(fold.iter().any(|i| y[*i] == label));
                    }
                }
            }
            Err(_) => {
                let smallest = Label::ALL
                    .iter()
                    .map(|label| y.iter().filter(|l| *l == label).count())
                    .min()
                    .unwrap_or(0);
                prop_assert!(smallest < 2);
            }
        }
    }
}
