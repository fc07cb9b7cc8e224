use crate::config::EvaluationConfig;
use crate::error::{Error, Result};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Metrics the evaluator knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Metric {
    F1Score,
    Precision,
    Recall,
    Accuracy,
    #[serde(rename = "ROCAUC")]
    RocAuc,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::F1Score => "F1Score",
            Metric::Precision => "Precision",
            Metric::Recall => "Recall",
            Metric::Accuracy => "Accuracy",
            Metric::RocAuc => "ROCAUC",
        };
        f.write_str(name)
    }
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::F1Score,
        Metric::Precision,
        Metric::Recall,
        Metric::Accuracy,
        Metric::RocAuc,
    ];
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Metric::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::Configuration(format!("unknown metric {:?}", name)))
    }
}

/// Result of one metric
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Value(f64),
    /// The metric is undefined for this input (e.g. one class only)
    NotComputable(String),
}

impl MetricOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricOutcome::Value(v) => Some(*v),
            MetricOutcome::NotComputable(_) => None,
        }
    }
}

/// Parallel label / prediction / score sequences, loaded independently.
#[derive(Debug, Clone)]
pub struct EvaluationDataset {
    pub labels: Array1<f64>,
    pub predictions: Array1<f64>,
    pub scores: Option<Array1<f64>>,
}

impl EvaluationDataset {
    pub fn new(labels: Vec<f64>, predictions: Vec<f64>, scores: Option<Vec<f64>>) -> Self {
        EvaluationDataset {
            labels: Array1::from_vec(labels),
            predictions: Array1::from_vec(predictions),
            scores: scores.map(Array1::from_vec),
        }
    }

    /// Load each file as one value per line, no header.
    pub fn load(config: &EvaluationConfig) -> Result<Self> {
        let labels = load_values(&config.labels_file)?;
        let predictions = load_values(&config.anomalies_file)?;
        let scores = match &config.scores_file {
            Some(path) => Some(load_values(path)?),
            None => None,
        };
        Ok(Self::new(labels, predictions, scores))
    }
}

/// Metrics in request order, plus any warnings raised along the way
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub name: Option<String>,
    pub results: Vec<(Metric, MetricOutcome)>,
    pub warnings: Vec<String>,
}

impl EvaluationReport {
    pub fn get(&self, metric: Metric) -> Option<&MetricOutcome> {
        self.results
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, outcome)| outcome)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "Evaluation: {}", name)?;
        }
        for (metric, outcome) in &self.results {
            match outcome {
                MetricOutcome::Value(v) => writeln!(f, "{}: {}", metric, v)?,
                MetricOutcome::NotComputable(reason) => {
                    writeln!(f, "{}: not computable ({})", metric, reason)?
                }
            }
        }
        Ok(())
    }
}

/// Offline scorer comparing predictions against ground truth
#[derive(Debug, Clone)]
pub struct Evaluator {
    metrics: Vec<Metric>,
    name: Option<String>,
}

impl Evaluator {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Evaluator {
            metrics,
            name: None,
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        Evaluator {
            metrics: config.metrics.clone(),
            name: config.name.clone(),
        }
    }

    /// Load the configured files and evaluate them.
    pub fn run(config: &EvaluationConfig) -> Result<EvaluationReport> {
        let dataset = EvaluationDataset::load(config)?;
        Ok(Self::from_config(config).evaluate(&dataset))
    }

    pub fn evaluate(&self, data: &EvaluationDataset) -> EvaluationReport {
        let mut report = EvaluationReport {
            name: self.name.clone(),
            ..Default::default()
        };

        let (n_labels, n_preds) = (data.labels.len(), data.predictions.len());
        if n_labels != n_preds {
            let warning = format!(
                "Labels and predictions have different lengths ({} vs {}). Truncating to shortest.",
                n_labels, n_preds
            );
            tracing::warn!(labels = n_labels, predictions = n_preds, "{}", warning);
            report.warnings.push(warning);
        }
        let n = n_labels.min(n_preds);
        let y_true = data.labels.slice(s![..n]);
        let y_pred = data.predictions.slice(s![..n]);
        let counts = Confusion::count(y_true, y_pred);

        for &metric in &self.metrics {
            let outcome = match metric {
                Metric::Precision => MetricOutcome::Value(counts.precision()),
                Metric::Recall => MetricOutcome::Value(counts.recall()),
                Metric::F1Score => MetricOutcome::Value(counts.f1()),
                Metric::Accuracy => MetricOutcome::Value(counts.accuracy()),
                Metric::RocAuc => self.roc_outcome(data, &mut report.warnings),
            };
            report.results.push((metric, outcome));
        }
        report
    }

    // ROC is truncated against the full label sequence, independently of predictions
    fn roc_outcome(&self, data: &EvaluationDataset, warnings: &mut Vec<String>) -> MetricOutcome {
        let Some(scores) = &data.scores else {
            return MetricOutcome::NotComputable("no scores provided".into());
        };
        let (n_labels, n_scores) = (data.labels.len(), scores.len());
        if n_labels != n_scores {
            let warning = format!(
                "Labels and scores have different lengths ({} vs {}). Truncating to shortest.",
                n_labels, n_scores
            );
            tracing::warn!(labels = n_labels, scores = n_scores, "{}", warning);
            warnings.push(warning);
        }
        let n = n_labels.min(n_scores);
        match roc_auc(data.labels.slice(s![..n]), scores.slice(s![..n])) {
            Some(auc) => MetricOutcome::Value(auc),
            None => MetricOutcome::NotComputable("only one class present in labels".into()),
        }
    }
}

/// Read one number per line; blank lines are skipped.
pub fn load_values(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::EvaluationInput {
        path: path.to_path_buf(),
        line: 0,
        reason: e.to_string(),
    })?;

    let mut values = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = line.parse::<f64>().map_err(|e| Error::EvaluationInput {
            path: path.to_path_buf(),
            line: idx + 1,
            reason: format!("{:?} is not a number: {}", line, e),
        })?;
        values.push(value);
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy, Default)]
struct Confusion {
    tp: f64,
    fp: f64,
    tn: f64,
    fn_count: f64,
}

impl Confusion {
    // Any non-zero label or prediction counts as the positive class
    fn count(labels: ArrayView1<f64>, predictions: ArrayView1<f64>) -> Self {
        let mut c = Confusion::default();
        for (&label, &predicted) in labels.iter().zip(predictions.iter()) {
            match (label != 0.0, predicted != 0.0) {
                (true, true) => c.tp += 1.0,
                (false, true) => c.fp += 1.0,
                (true, false) => c.fn_count += 1.0,
                (false, false) => c.tn += 1.0,
            }
        }
        c
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_count)
    }

    fn f1(&self) -> f64 {
        let (precision, recall) = (self.precision(), self.recall());
        ratio(2.0 * precision * recall, precision + recall)
    }

    fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.tp + self.tn + self.fp + self.fn_count)
    }
}

// Zero division yields 0.0
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Area under the ROC curve via the rank statistic, ties sharing their average rank.
///
/// Returns `None` when the labels hold fewer than two classes.
pub fn roc_auc(labels: ArrayView1<f64>, scores: ArrayView1<f64>) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&l| l != 0.0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(ranks.iter())
        .filter(|(l, _)| **l != 0.0)
        .map(|(_, &r)| r)
        .sum();
    let (n_pos, n_neg) = (n_pos as f64, n_neg as f64);
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
