use std::fs;
use streamad::config::{EvaluationConfig, PipelineConfig, StopAction};
use streamad::runtime::evaluate_after_stop;
use streamad::utils::evaluation::EvaluationDataset;
use streamad::{Error, Evaluator, Metric, MetricOutcome};

fn close(outcome: Option<&MetricOutcome>, expected: f64) -> bool {
    outcome
        .and_then(MetricOutcome::value)
        .map(|v| (v - expected).abs() < 1e-9)
        .unwrap_or(false)
}

#[test]
fn unequal_lengths_are_truncated_with_a_warning() {
    let labels = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
    let predictions = vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0];
    let report = Evaluator::new(vec![Metric::Precision, Metric::Recall, Metric::Accuracy])
        .evaluate(&EvaluationDataset::new(labels, predictions, None));

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("(10 vs 7)"));
    // First 7: tp=2 fp=1 fn=1 tn=3
    assert!(close(report.get(Metric::Precision), 2.0 / 3.0));
    assert!(close(report.get(Metric::Recall), 2.0 / 3.0));
    assert!(close(report.get(Metric::Accuracy), 5.0 / 7.0));
}

#[test]
fn single_class_labels_make_roc_not_computable() {
    let report = Evaluator::new(vec![Metric::F1Score, Metric::RocAuc]).evaluate(
        &EvaluationDataset::new(vec![0.0; 4], vec![0.0, 1.0, 0.0, 0.0], Some(vec![0.1, 0.9, 0.2, 0.3])),
    );
    assert!(matches!(
        report.get(Metric::RocAuc),
        Some(MetricOutcome::NotComputable(_))
    ));
    // No true positives: zero division yields 0
    assert!(close(report.get(Metric::F1Score), 0.0));
}

#[test]
fn results_follow_requested_order() {
    let metrics = vec![Metric::Accuracy, Metric::F1Score, Metric::Recall];
    let report = Evaluator::new(metrics.clone())
        .evaluate(&EvaluationDataset::new(vec![1.0, 0.0], vec![1.0, 0.0], None));
    let order: Vec<Metric> = report.results.iter().map(|(m, _)| *m).collect();
    assert_eq!(order, metrics);
}

#[test]
fn roc_truncates_against_labels_not_predictions() {
    // ROC sees 3 pairs; cutting to the 2 predictions would give 1.0 instead
    let report = Evaluator::new(vec![Metric::Precision, Metric::RocAuc]).evaluate(
        &EvaluationDataset::new(
            vec![0.0, 1.0, 1.0, 0.0],
            vec![0.0, 1.0],
            Some(vec![0.5, 0.9, 0.1]),
        ),
    );
    assert!(close(report.get(Metric::RocAuc), 0.5));
    assert!(close(report.get(Metric::Precision), 1.0));
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].contains("(4 vs 2)"));
    assert!(report.warnings[1].contains("(4 vs 3)"));
}

#[test]
fn in_memory_roc_without_scores_is_not_computable() {
    let report = Evaluator::new(vec![Metric::RocAuc])
        .evaluate(&EvaluationDataset::new(vec![0.0, 1.0], vec![0.0, 1.0], None));
    assert!(matches!(
        report.get(Metric::RocAuc),
        Some(MetricOutcome::NotComputable(_))
    ));
}

fn eval_config(dir: &tempfile::TempDir, labels: &str, flags: &str, scores: &str) -> EvaluationConfig {
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    };
    EvaluationConfig {
        name: Some("Eval".into()),
        labels_file: write("labels.csv", labels),
        anomalies_file: write("alerts.csv", flags),
        scores_file: Some(write("results.csv", scores)),
        metrics: Metric::ALL.to_vec(),
    }
}

#[test]
fn evaluates_files_written_by_the_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let config = eval_config(&dir, "0\n0\n1\n1\n", "0\n0\n1\n0\n", "0\n0.2\n-20\n5\n\n");

    let report = Evaluator::run(&config).unwrap();
    assert!(report.warnings.is_empty());
    assert!(close(report.get(Metric::Precision), 1.0));
    assert!(close(report.get(Metric::Recall), 0.5));
    assert!(close(report.get(Metric::Accuracy), 0.75));
    // Positives rank 1st and 4th of four
    assert!(close(report.get(Metric::RocAuc), 0.5));

    let text = report.to_string();
    assert!(text.starts_with("Evaluation: Eval\n"));
    assert!(text.contains("Recall: 0.5\n"));
}

#[test]
fn non_numeric_lines_are_reported_with_position() {
    let dir = tempfile::tempdir().unwrap();
    let config = eval_config(&dir, "0\n1\nyes\n", "0\n1\n1\n", "0\n1\n1\n");
    match Evaluator::run(&config) {
        Err(Error::EvaluationInput { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected evaluation input error, got {:?}", other),
    }
}

#[test]
fn stop_action_controls_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::from_toml_str(
        r#"
        [model]
        kind = "fixed_threshold"
        threshold = 80
        "#,
    )
    .unwrap();
    config.evaluation = Some(eval_config(&dir, "0\n1\n", "0\n1\n", "0.1\n0.9\n"));

    let never = || -> std::io::Result<bool> { panic!("should not prompt") };
    assert!(evaluate_after_stop(&config, StopAction::Exit, never)
        .unwrap()
        .is_none());
    assert!(evaluate_after_stop(&config, StopAction::Evaluate, never)
        .unwrap()
        .is_some());
    assert!(evaluate_after_stop(&config, StopAction::Ask, || Ok(false))
        .unwrap()
        .is_none());

    let report = evaluate_after_stop(&config, StopAction::Ask, || Ok(true))
        .unwrap()
        .unwrap();
    assert!(close(report.get(Metric::RocAuc), 1.0));

    config.evaluation = None;
    assert!(evaluate_after_stop(&config, StopAction::Evaluate, never)
        .unwrap()
        .is_none());
}
