//! Bounded, cancellable collection of detections across sample timestamps.
//!
//! Each timestamp is an independent blocking call into the external text
//! detector. Calls run on tokio's blocking pool with at most
//! `min(concurrency, samples)` in flight. A failed sample contributes zero
//! detections and is counted; it never aborts the other samples.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::{Detection, RawDetection, RecordedDetection};
use clearmark_tracking_core::heuristics::TextHeuristics;
use clearmark_tracking_core::sampler::SamplePlan;

/// The external text/logo detector.
pub trait TextDetector: Send + Sync + 'static {
    /// Detect candidate regions in the frame at `time_secs`. May block.
    fn detect(&self, time_secs: f64) -> ClearmarkResult<Vec<RawDetection>>;

    /// Detector name for logs.
    fn name(&self) -> &str;
}

/// Replays recorded detector output.
///
/// A sample receives every record within `tolerance_secs` of its timestamp.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    records: Vec<RecordedDetection>,
    tolerance_secs: f64,
}

impl ReplayDetector {
    pub fn new(records: Vec<RecordedDetection>, tolerance_secs: f64) -> Self {
        Self {
            records,
            tolerance_secs: tolerance_secs.max(0.0),
        }
    }

    /// Distinct record times, ascending.
    pub fn recorded_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self.records.iter().map(|r| r.time_secs).collect();
        times.sort_by(f64::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        times
    }
}

impl TextDetector for ReplayDetector {
    fn detect(&self, time_secs: f64) -> ClearmarkResult<Vec<RawDetection>> {
        Ok(self
            .records
            .iter()
            .filter(|r| (r.time_secs - time_secs).abs() <= self.tolerance_secs)
            .map(|r| r.raw.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Cooperative cancellation shared between a caller and running collections.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // every clone holds the sender, so this only happens on teardown
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters describing one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub samples: usize,
    pub succeeded: usize,
    /// Samples whose detector call failed; they contribute no detections.
    pub failed: usize,
    pub detections: usize,
    /// Worker pool size actually used.
    pub workers: usize,
}

/// Annotated detections from every successful sample, in sample order.
#[derive(Debug, Clone)]
pub struct Collection {
    pub detections: Vec<Detection>,
    pub report: CollectionReport,
}

/// Runs the detector over a sample plan with bounded concurrency.
pub struct DetectionCollector<D: TextDetector> {
    detector: Arc<D>,
    concurrency: usize,
}

impl<D: TextDetector> DetectionCollector<D> {
    pub fn new(detector: D, concurrency: usize) -> Self {
        Self {
            detector: Arc::new(detector),
            concurrency: concurrency.max(1),
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Collect detections for every sample timestamp.
    ///
    /// Returns [`ClearmarkError::Cancelled`] if `cancel` fires first; in-flight
    /// results are then discarded.
    pub async fn collect(
        &self,
        samples: &SamplePlan,
        heuristics: &TextHeuristics,
        cancel: &CancelToken,
    ) -> ClearmarkResult<Collection> {
        let workers = self.concurrency.min(samples.len());
        let mut report = CollectionReport {
            samples: samples.len(),
            workers,
            ..Default::default()
        };
        if samples.is_empty() {
            return Ok(Collection {
                detections: Vec::new(),
                report,
            });
        }

        tracing::info!(
            detector = self.detector.name(),
            samples = samples.len(),
            workers,
            "Collecting detections"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for (index, &time_secs) in samples.timestamps.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let detector = Arc::clone(&self.detector);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let joined = tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            detector.detect(time_secs)
                        })
                        .await;
                        joined.unwrap_or_else(|e| {
                            Err(ClearmarkError::detection(format!("detector task failed: {e}")))
                        })
                    }
                    Err(e) => Err(ClearmarkError::detection(format!(
                        "detector pool closed: {e}"
                    ))),
                };
                (index, time_secs, result)
            });
        }

        let mut per_sample: Vec<Option<Vec<RawDetection>>> = vec![None; samples.len()];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    tracing::warn!(
                        completed = report.succeeded + report.failed,
                        samples = report.samples,
                        "Detection collection cancelled"
                    );
                    return Err(ClearmarkError::Cancelled);
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((index, _, Ok(raws))) => {
                            report.succeeded += 1;
                            per_sample[index] = Some(raws);
                        }
                        Ok((_, time_secs, Err(err))) => {
                            report.failed += 1;
                            if err.is_per_sample() {
                                tracing::warn!(time_secs, error = %err, "Detector failed for sample");
                            } else {
                                tracing::error!(time_secs, error = %err, "Detector failed for sample");
                            }
                        }
                        Err(err) => {
                            report.failed += 1;
                            tracing::warn!(error = %err, "Detector task did not complete");
                        }
                    }
                }
            }
        }

        let detections: Vec<Detection> = per_sample
            .into_iter()
            .zip(&samples.timestamps)
            .filter_map(|(raws, &time_secs)| raws.map(|raws| (time_secs, raws)))
            .flat_map(|(time_secs, raws)| {
                raws.into_iter()
                    .map(move |raw| heuristics.annotate(time_secs, raw))
            })
            .collect();
        report.detections = detections.len();

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            detections = report.detections,
            "Detection collection complete"
        );

        Ok(Collection { detections, report })
    }
}
