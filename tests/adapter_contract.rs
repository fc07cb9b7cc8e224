use streamad::models::base_model::{BatchCapable, BatchScores, Model, ScoreFlag, SingleCapable};
use streamad::models::threshold::{FixedThreshold, FixedThresholdBatch};
use streamad::{AdapterMode, Emission, Error, ModelAdapter, WorkUnit};

struct WrongLength;

impl BatchCapable for WrongLength {
    fn process_batch(&mut self, values: &[f64]) -> streamad::Result<BatchScores> {
        Ok((vec![0.0; values.len() - 1], vec![0; values.len()]))
    }
}

struct BadFlag;

impl SingleCapable for BadFlag {
    fn process_one(&mut self, x: f64) -> streamad::Result<ScoreFlag> {
        Ok((x, 2))
    }
}

#[test]
fn single_model_answers_every_feed() {
    let mut adapter = ModelAdapter::new(Model::single(FixedThreshold::new(80.0)), None).unwrap();
    assert_eq!(adapter.mode(), AdapterMode::Single);

    let out = adapter.feed(75.0).unwrap();
    assert_eq!(
        out,
        Some(Emission {
            values: vec![75.0],
            scores: vec![-5.0],
            flags: vec![1],
        })
    );
    assert_eq!(adapter.pending(), 0);
    assert_eq!(adapter.flush().unwrap(), None);
}

#[test]
fn batch_model_emits_every_third_value() {
    let mut adapter =
        ModelAdapter::new(Model::batch(FixedThresholdBatch::new(80.0)), Some(3)).unwrap();
    assert_eq!(adapter.mode(), AdapterMode::Batch { batch_size: 3 });

    assert_eq!(adapter.feed(70.0).unwrap(), None);
    assert_eq!(adapter.feed(90.0).unwrap(), None);
    assert_eq!(adapter.pending(), 2);

    let out = adapter.feed(85.0).unwrap().unwrap();
    assert_eq!(out.values, vec![70.0, 90.0, 85.0]);
    assert_eq!(out.scores, vec![-10.0, 10.0, 5.0]);
    assert_eq!(out.flags, vec![1, 0, 0]);
    assert_eq!(adapter.pending(), 0);
}

#[test]
fn flush_scores_a_partial_batch_once() {
    let mut adapter =
        ModelAdapter::new(Model::batch(FixedThresholdBatch::new(80.0)), Some(4)).unwrap();
    adapter.feed(81.0).unwrap();
    adapter.feed(79.0).unwrap();

    let out = adapter.flush().unwrap().unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out.flags, vec![0, 1]);
    assert_eq!(adapter.flush().unwrap(), None);
}

#[test]
fn batch_model_without_batch_size_is_rejected() {
    for size in [None, Some(0)] {
        let result = ModelAdapter::new(Model::batch(FixedThresholdBatch::new(80.0)), size);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}

#[test]
fn mismatched_lengths_are_contract_violations() {
    let mut adapter = ModelAdapter::new(Model::batch(WrongLength), Some(2)).unwrap();
    adapter.feed(1.0).unwrap();
    match adapter.feed(2.0) {
        Err(Error::ContractViolation { unit, .. }) => assert_eq!(unit, WorkUnit::Unattributed),
        other => panic!("expected contract violation, got {:?}", other),
    }
    // The failed batch is gone; the adapter keeps working
    assert_eq!(adapter.pending(), 0);
    adapter.feed(3.0).unwrap();
    assert_eq!(adapter.pending(), 1);
}

#[test]
fn flags_outside_zero_one_are_rejected() {
    let mut adapter = ModelAdapter::new(Model::single(BadFlag), None).unwrap();
    assert!(matches!(
        adapter.feed(1.0),
        Err(Error::ContractViolation { .. })
    ));
}
