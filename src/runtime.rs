//! Streaming runtime: bounded ingest queue, single processing path, stop handling.

use crate::config::{PipelineConfig, QueuePolicy, SourceConfig, StopAction};
use crate::error::{Error, Result};
use crate::processor::{ScoreRecord, StreamProcessor};
use crate::sinks::{self, RecordSink};
use crate::utils::evaluation::{EvaluationReport, Evaluator};
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one run of the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Payloads taken off the queue
    pub received: u64,
    /// Records written to the sinks
    pub processed: u64,
    /// Payloads that did not yield a sample
    pub skipped: u64,
    /// Payloads discarded by a full queue
    pub dropped: u64,
    pub alerts: u64,
    pub contract_violations: u64,
    pub sink_errors: u64,
}

/// Extract the numeric `attribute` from a JSON payload.
///
/// Numbers and numeric strings are accepted; anything else is a
/// [`Error::TransientInput`].
pub fn parse_sample(payload: &str, attribute: &str) -> Result<f64> {
    let doc: Value = serde_json::from_str(payload)
        .map_err(|e| Error::TransientInput(format!("malformed payload: {}", e)))?;
    let field = doc
        .get(attribute)
        .ok_or_else(|| Error::TransientInput(format!("attribute {:?} missing", attribute)))?;

    let value = match field {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        Error::TransientInput(format!("attribute {:?} is not numeric: {}", attribute, field))
    })?;

    if !value.is_finite() {
        return Err(Error::TransientInput(format!(
            "attribute {:?} is not finite: {}",
            attribute, value
        )));
    }
    Ok(value)
}

/// A processor wired to its sinks. Handles one message to completion at a time.
pub struct Pipeline {
    attribute: String,
    processor: StreamProcessor,
    sinks: Vec<Box<dyn RecordSink>>,
    summary: RunSummary,
}

impl Pipeline {
    pub fn new(
        attribute: impl Into<String>,
        processor: StreamProcessor,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> Self {
        Pipeline {
            attribute: attribute.into(),
            processor,
            sinks,
            summary: RunSummary::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let processor = StreamProcessor::from_config(config)?;
        let sinks = sinks::build(config)?;
        Ok(Self::new(config.attribute.clone(), processor, sinks))
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn processor(&self) -> &StreamProcessor {
        &self.processor
    }

    /// Parse, process and persist one payload. Never fails: problems are
    /// logged and counted, and the stream moves on.
    pub fn handle_message(&mut self, payload: &str) -> Vec<ScoreRecord> {
        self.summary.received += 1;
        let value = match parse_sample(payload, &self.attribute) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "skipping message");
                self.summary.skipped += 1;
                return Vec::new();
            }
        };
        let result = self.processor.process(value);
        self.dispatch(result)
    }

    /// Stop: score any partially filled batch and flush every sink.
    pub fn finish(&mut self) -> Vec<ScoreRecord> {
        let pending = self.processor.pending();
        if pending > 0 {
            info!(pending, "flushing partial batch");
        }
        let result = self.processor.flush();
        let records = self.dispatch(result);

        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                error!(sink = sink.name(), error = %e, "sink flush failed");
                self.summary.sink_errors += 1;
            }
        }
        records
    }

    fn dispatch(&mut self, result: Result<Vec<ScoreRecord>>) -> Vec<ScoreRecord> {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "model output rejected, continuing with next sample");
                self.summary.contract_violations += 1;
                return Vec::new();
            }
        };
        if records.is_empty() {
            return records;
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.write(&records) {
                error!(sink = sink.name(), error = %e, "sink write failed");
                self.summary.sink_errors += 1;
            }
        }

        for record in &records {
            self.summary.processed += 1;
            debug!(
                sample = record.index,
                value = record.value,
                score = record.score,
                "received value"
            );
            if record.is_anomaly() {
                self.summary.alerts += 1;
                warn!(
                    sample = record.index,
                    value = record.value,
                    score = record.score,
                    "anomaly detected"
                );
            }
        }
        records
    }
}

/// Newline-delimited JSON payloads
pub type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Where the ingest task pulls lines from.
pub enum LineInput {
    /// A reader driven by the runtime itself
    Async(Lines<LineSource>),
    /// Lines forwarded by a dedicated OS thread
    Thread(mpsc::Receiver<io::Result<String>>),
}

impl LineInput {
    /// Read `reader` on its own detached thread, so a read that never returns
    /// (an idle terminal or pipe) cannot hold up runtime shutdown.
    pub fn from_blocking<R: Read + Send + 'static>(reader: R, capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        std::thread::Builder::new()
            .name("streamad-input".into())
            .spawn(move || {
                for line in std::io::BufReader::new(reader).lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(LineInput::Thread(rx))
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self {
            LineInput::Async(lines) => lines.next_line().await,
            LineInput::Thread(rx) => rx.recv().await.transpose(),
        }
    }
}

impl From<LineSource> for LineInput {
    fn from(source: LineSource) -> Self {
        LineInput::Async(source.lines())
    }
}

async fn open_source(source: &SourceConfig, capacity: usize) -> Result<LineInput> {
    Ok(match source {
        SourceConfig::Stdin => LineInput::from_blocking(io::stdin(), capacity)?,
        SourceConfig::File { path } => {
            let file: LineSource = Box::new(BufReader::new(tokio::fs::File::open(path).await?));
            file.into()
        }
    })
}

/// Read payload lines into the bounded queue until the source ends or `stop` fires.
async fn ingest(
    mut input: LineInput,
    tx: mpsc::Sender<String>,
    policy: QueuePolicy,
    stop: CancellationToken,
    dropped: Arc<AtomicU64>,
) -> Result<()> {
    loop {
        let line = tokio::select! {
            _ = stop.cancelled() => break,
            line = input.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("source exhausted");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match policy {
            QueuePolicy::Block => {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    sent = tx.send(line) => if sent.is_err() { break },
                }
            }
            QueuePolicy::DropNewest => match tx.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped = total, "queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => break,
            },
        }
    }
    Ok(())
}

/// Run the pipeline until the source ends or `stop` is cancelled.
///
/// On stop no further payloads are read; those already queued are processed,
/// the adapter is flushed and the sinks are flushed.
pub async fn run(config: &PipelineConfig, stop: CancellationToken) -> Result<RunSummary> {
    let mut pipeline = Pipeline::from_config(config)?;
    let source = open_source(&config.source, config.queue.capacity).await?;
    run_pipeline(&mut pipeline, source, config.queue.capacity, config.queue.policy, stop).await
}

/// [`run`] over an already built pipeline and source.
pub async fn run_pipeline(
    pipeline: &mut Pipeline,
    source: impl Into<LineInput>,
    capacity: usize,
    policy: QueuePolicy,
    stop: CancellationToken,
) -> Result<RunSummary> {
    let (tx, mut rx) = mpsc::channel::<String>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let reader = tokio::spawn(ingest(source.into(), tx, policy, stop.clone(), dropped.clone()));

    info!(capacity, ?policy, "streaming started");
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!("stop requested");
                break;
            }
            msg = rx.recv() => match msg {
                Some(payload) => {
                    pipeline.handle_message(&payload);
                }
                None => {
                    info!("input closed");
                    break;
                }
            },
        }
    }

    // Halt acceptance, then drain what was already accepted
    stop.cancel();
    rx.close();
    while let Some(payload) = rx.recv().await {
        pipeline.handle_message(&payload);
    }
    match reader.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "input source failed"),
        Err(e) => error!(error = %e, "input task panicked"),
    }

    pipeline.finish();
    let mut summary = pipeline.summary();
    summary.dropped = dropped.load(Ordering::Relaxed);
    info!(
        received = summary.received,
        processed = summary.processed,
        skipped = summary.skipped,
        dropped = summary.dropped,
        alerts = summary.alerts,
        contract_violations = summary.contract_violations,
        "streaming stopped"
    );
    Ok(summary)
}

/// Cancel `stop` on Ctrl-C. A second Ctrl-C exits the process at once.
pub fn cancel_on_ctrl_c(stop: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            return;
        }
        stop.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting without cleanup");
            std::process::exit(130);
        }
    });
}

/// Ask on `output` whether to evaluate and read a y/n answer from `input`.
///
/// Anything but `y` or `yes` (case-insensitive) declines, including end of input.
pub fn confirm_evaluation(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "Do you want to continue with the evaluation so far? (y/n) ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Apply the stop action: maybe evaluate the files written so far.
///
/// `confirm` is only consulted for [`StopAction::Ask`]. A missing evaluation
/// section is not an error.
pub fn evaluate_after_stop(
    config: &PipelineConfig,
    action: StopAction,
    confirm: impl FnOnce() -> io::Result<bool>,
) -> Result<Option<EvaluationReport>> {
    let proceed = match action {
        StopAction::Exit => false,
        StopAction::Evaluate => true,
        StopAction::Ask => confirm()?,
    };
    if !proceed {
        info!("exiting without evaluation");
        return Ok(None);
    }
    match &config.evaluation {
        Some(eval) => {
            info!(name = eval.name.as_deref().unwrap_or("evaluation"), "running evaluation");
            Evaluator::run(eval).map(Some)
        }
        None => {
            warn!("evaluation cannot be performed: no evaluation section configured");
            Ok(None)
        }
    }
}
