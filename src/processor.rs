//! Phase-aware per-sample processing: preprocess, model, sanitise, classify.

use crate::adapter::{AdapterMode, Emission, ModelAdapter};
use crate::classify::{Classifier, ThresholdPolicy};
use crate::config::PipelineConfig;
use crate::error::{Result, WorkUnit};
use crate::models;
use crate::phase::{Phase, PhaseController};
use crate::preprocess::Preprocessor;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// One classified sample, ready for the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRecord {
    /// 1-based arrival index
    pub index: u64,
    /// Raw value as received, before preprocessing
    pub value: f64,
    pub score: f64,
    pub flag: u8,
}

impl ScoreRecord {
    /// Warm-up output: `(0.0, 0)` regardless of what the model said
    pub fn neutral(index: u64, value: f64) -> Self {
        ScoreRecord {
            index,
            value,
            score: 0.0,
            flag: 0,
        }
    }

    pub fn is_anomaly(&self) -> bool {
        self.flag == 1
    }
}

/// Runs each sample through the warm-up / detection state machine.
///
/// Every sample with index `<= start_index` yields a neutral record; its score
/// still trains an adaptive threshold. Later samples are sanitised and
/// classified. Batch models may emit several records for one call, or none.
pub struct StreamProcessor {
    preprocessor: Preprocessor,
    phase: PhaseController,
    adapter: ModelAdapter,
    classifier: Classifier,
    // (index, raw value) for every sample the adapter has not answered yet
    in_flight: VecDeque<(u64, f64)>,
}

impl StreamProcessor {
    pub fn new(
        preprocessor: Preprocessor,
        start_index: u64,
        adapter: ModelAdapter,
        classifier: Classifier,
    ) -> Self {
        StreamProcessor {
            preprocessor,
            phase: PhaseController::new(start_index),
            adapter,
            classifier,
            in_flight: VecDeque::new(),
        }
    }

    /// Build the model, adapter and policies described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let (model, batch_size) = models::build(&config.model)?;
        let adapter = ModelAdapter::new(model, batch_size)?;
        let classifier = Classifier::new(ThresholdPolicy::from_config(&config.classifier));

        match adapter.mode() {
            AdapterMode::Single => info!(
                start_index = config.profile.start_index,
                "single-value model ready"
            ),
            AdapterMode::Batch { batch_size } => info!(
                start_index = config.profile.start_index,
                batch_size,
                "batch model ready"
            ),
        }

        Ok(Self::new(
            Preprocessor::from_config(&config.preprocessor),
            config.profile.start_index,
            adapter,
            classifier,
        ))
    }

    pub fn phase(&self) -> Phase {
        self.phase.current()
    }

    pub fn samples_seen(&self) -> u64 {
        self.phase.samples_seen()
    }

    /// Samples buffered in the adapter, not yet scored
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Process one raw value.
    ///
    /// A contract violation is returned attributed to the sample or batch that
    /// caused it; those samples are dropped and the processor stays usable.
    pub fn process(&mut self, x: f64) -> Result<Vec<ScoreRecord>> {
        let step = self.phase.advance();
        if step.entered_active {
            info!(sample = step.index, "warm-up complete, detection active");
            self.preprocessor.on_active();
            self.adapter.on_active();
        }

        let scaled = self.preprocessor.process(x);
        self.in_flight.push_back((step.index, x));
        let result = self.adapter.feed(scaled);
        self.complete(result)
    }

    /// Score whatever the adapter still holds (a short batch, possibly).
    pub fn flush(&mut self) -> Result<Vec<ScoreRecord>> {
        let result = self.adapter.flush();
        self.complete(result)
    }

    fn complete(&mut self, result: Result<Option<Emission>>) -> Result<Vec<ScoreRecord>> {
        // Whatever left the adapter buffer, answered or not, leaves in_flight too
        let consumed = self.in_flight.len() - self.adapter.pending();
        let samples: Vec<(u64, f64)> = self.in_flight.drain(..consumed).collect();

        let emission = match result {
            Ok(Some(emission)) => emission,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => return Err(e.attributed_to(work_unit(&samples))),
        };

        let records = samples
            .iter()
            .zip(emission.scores.iter().zip(emission.flags.iter()))
            .map(|(&(index, value), (&score, &flag))| match self.phase.phase_of(index) {
                Phase::Warmup => {
                    self.classifier.learn(score);
                    ScoreRecord::neutral(index, value)
                }
                Phase::Active => {
                    let (score, anomalous) = self.classifier.classify(score, flag == 1);
                    ScoreRecord {
                        index,
                        value,
                        score,
                        flag: u8::from(anomalous),
                    }
                }
            })
            .collect::<Vec<_>>();

        debug!(emitted = records.len(), "model output classified");
        Ok(records)
    }
}

fn work_unit(samples: &[(u64, f64)]) -> WorkUnit {
    match samples {
        [] => WorkUnit::Unattributed,
        [(index, _)] => WorkUnit::Sample(*index),
        [(start, _), ..] => WorkUnit::Batch {
            start: *start,
            len: samples.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessMethod;
    use crate::error::Error;
    use crate::models::base_model::{BatchCapable, BatchScores, Model, ScoreFlag, SingleCapable};
    use crate::models::threshold::{FixedThreshold, FixedThresholdBatch};

    fn processor(model: Model, batch: Option<usize>, start: u64, policy: ThresholdPolicy) -> StreamProcessor {
        StreamProcessor::new(
            Preprocessor::new(PreprocessMethod::None, false),
            start,
            ModelAdapter::new(model, batch).unwrap(),
            Classifier::new(policy),
        )
    }

    struct Echo;

    impl SingleCapable for Echo {
        fn process_one(&mut self, x: f64) -> Result<ScoreFlag> {
            Ok((x, 1))
        }
    }

    struct FailsOnSecondBatch {
        calls: usize,
    }

    impl BatchCapable for FailsOnSecondBatch {
        fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores> {
            self.calls += 1;
            if self.calls == 2 {
                return Ok((vec![1.0], vec![0]));
            }
            Ok((values.to_vec(), vec![0; values.len()]))
        }
    }

    #[test]
    fn warmup_records_are_neutral() {
        let mut p = processor(Model::single(Echo), None, 3, ThresholdPolicy::Model);
        for i in 1..=3 {
            let records = p.process(i as f64 * 100.0).unwrap();
            assert_eq!(records, vec![ScoreRecord::neutral(i, i as f64 * 100.0)]);
        }
        assert_eq!(p.phase(), Phase::Warmup);

        let records = p.process(7.0).unwrap();
        assert_eq!(records[0].score, 7.0);
        assert_eq!(records[0].flag, 1);
        assert_eq!(p.phase(), Phase::Active);
    }

    #[test]
    fn non_finite_active_scores_are_zeroed() {
        let mut p = processor(Model::single(Echo), None, 0, ThresholdPolicy::Model);
        let records = p.process(f64::INFINITY).unwrap();
        assert_eq!((records[0].score, records[0].flag), (0.0, 0));

        let records = p.process(2e9).unwrap();
        assert_eq!((records[0].score, records[0].flag), (1e6, 1));
    }

    #[test]
    fn batch_straddling_warmup_splits_per_sample() {
        let mut p = processor(
            Model::batch(FixedThresholdBatch::new(80.0)),
            Some(3),
            2,
            ThresholdPolicy::Model,
        );
        assert!(p.process(70.0).unwrap().is_empty());
        assert!(p.process(75.0).unwrap().is_empty());
        assert_eq!(p.pending(), 2);

        let records = p.process(60.0).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], ScoreRecord::neutral(1, 70.0));
        assert_eq!(records[1], ScoreRecord::neutral(2, 75.0));
        assert_eq!(
            records[2],
            ScoreRecord {
                index: 3,
                value: 60.0,
                score: -20.0,
                flag: 1
            }
        );
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn flush_emits_short_batch() {
        let mut p = processor(
            Model::batch(FixedThresholdBatch::new(80.0)),
            Some(3),
            0,
            ThresholdPolicy::Model,
        );
        p.process(90.0).unwrap();
        let records = p.flush().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 10.0);
        assert!(p.flush().unwrap().is_empty());
    }

    #[test]
    fn contract_violation_is_isolated_to_its_batch() {
        let mut p = processor(
            Model::batch(FailsOnSecondBatch { calls: 0 }),
            Some(2),
            0,
            ThresholdPolicy::Model,
        );
        assert_eq!(p.process(1.0).unwrap().len(), 0);
        assert_eq!(p.process(2.0).unwrap().len(), 2);
        p.process(3.0).unwrap();

        match p.process(4.0) {
            Err(Error::ContractViolation { unit, .. }) => {
                assert_eq!(unit, WorkUnit::Batch { start: 3, len: 2 })
            }
            other => panic!("expected contract violation, got {:?}", other),
        }
        assert_eq!(p.pending(), 0);

        p.process(5.0).unwrap();
        let records = p.process(6.0).unwrap();
        assert_eq!(records.iter().map(|r| r.index).collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn quantile_policy_learns_only_in_warmup() {
        let mut p = processor(
            Model::single(Echo),
            None,
            4,
            ThresholdPolicy::Quantile {
                filter: crate::classify::QuantileFilter::new(0.5, 0.5),
                adapt_during_detection: false,
            },
        );
        for x in [1.0, 2.0, 3.0, 4.0] {
            p.process(x).unwrap();
        }
        let learned = match p.classifier().policy() {
            ThresholdPolicy::Quantile { filter, .. } => filter.estimate().unwrap(),
            _ => unreachable!(),
        };

        let high = p.process(learned + 1.0).unwrap();
        let low = p.process(learned - 1.0).unwrap();
        assert_eq!(high[0].flag, 1);
        assert_eq!(low[0].flag, 0);
        match p.classifier().policy() {
            ThresholdPolicy::Quantile { filter, .. } => {
                assert_eq!(filter.estimate(), Some(learned));
                assert_eq!(filter.observed(), 4);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn single_threshold_model_through_processor() {
        let mut p = processor(Model::single(FixedThreshold::new(80.0)), None, 0, ThresholdPolicy::Model);
        let records = p.process(75.0).unwrap();
        assert_eq!((records[0].score, records[0].flag), (-5.0, 1));
    }

    use std::sync::{Arc, Mutex};

    /// Batch model that logs every value it receives and the activation hook
    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl BatchCapable for Recording {
        fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores> {
            let mut log = self.log.lock().unwrap();
            log.extend(values.iter().map(|v| format!("value {}", v)));
            Ok((values.to_vec(), vec![0; values.len()]))
        }

        fn on_active(&mut self) {
            self.log.lock().unwrap().push("on_active".to_string());
        }
    }

    #[test]
    fn batch_model_sees_buffered_warmup_values_before_activation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut p = processor(
            Model::batch(Recording { log: log.clone() }),
            Some(3),
            2,
            ThresholdPolicy::Model,
        );
        for x in [1.0, 2.0, 3.0] {
            p.process(x).unwrap();
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec!["value 1", "value 2", "value 3", "on_active"]
        );
    }

    #[test]
    fn batch_aligned_with_warmup_activates_before_next_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut p = processor(
            Model::batch(Recording { log: log.clone() }),
            Some(2),
            2,
            ThresholdPolicy::Model,
        );
        for x in [1.0, 2.0, 3.0] {
            p.process(x).unwrap();
        }
        p.flush().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["value 1", "value 2", "on_active", "value 3"]
        );
    }
}
