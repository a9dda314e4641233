//! Per-video removal session with one fallback retry per track.
//!
//! The session submits every synthesized plan to the backend. When the
//! backend refuses some plans, each refused track is re-planned once as a
//! forced blackout over its union region and the job is resubmitted. A
//! track refused again is abandoned; the remaining tracks still run.
//!
//! A backend like ffmpeg cannot say which stage broke a graph, so it refuses
//! every track in the job. When such a refusal hits tracks that have used
//! their retry, each of them is first run alone once, and only the tracks
//! refused on their own are abandoned.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use clearmark_common::clock::RunClock;
use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::plan::{PlanShape, TrackState};
use clearmark_tracking_core::pipeline::{Analysis, AnalyzedTrack, WatermarkAnalyzer};
use clearmark_tracking_core::planner::PlanningContext;

use crate::engine::{Execution, RemovalBackend, RemovalJob};

/// Final state of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub track_id: u32,
    pub state: TrackState,
    pub shape: PlanShape,
    pub segments: usize,
    pub retried: bool,
    pub error: Option<String>,
}

/// Summary of a removal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub backend: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    /// Jobs submitted to the backend.
    pub attempts: usize,
    pub tracks: Vec<TrackOutcome>,
}

impl SessionReport {
    pub fn executed(&self) -> Vec<u32> {
        self.ids_in(TrackState::Executed)
    }

    pub fn abandoned(&self) -> Vec<u32> {
        self.ids_in(TrackState::Abandoned)
    }

    fn ids_in(&self, state: TrackState) -> Vec<u32> {
        self.tracks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.track_id)
            .collect()
    }
}

/// Drives one video's plans through a removal backend.
pub struct RemovalSession<'a> {
    analyzer: &'a WatermarkAnalyzer,
    ctx: PlanningContext,
    input_path: PathBuf,
    output_path: PathBuf,
    tracks: Vec<AnalyzedTrack>,
    errors: Vec<Option<String>>,
    isolated: Vec<bool>,
}

impl<'a> RemovalSession<'a> {
    pub fn new(
        analyzer: &'a WatermarkAnalyzer,
        ctx: PlanningContext,
        analysis: Analysis,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        let errors = vec![None; analysis.tracks.len()];
        let isolated = vec![false; analysis.tracks.len()];
        Self {
            analyzer,
            ctx,
            input_path,
            output_path,
            tracks: analysis.tracks,
            errors,
            isolated,
        }
    }

    pub fn tracks(&self) -> &[AnalyzedTrack] {
        &self.tracks
    }

    /// Submit plans until every track is executed or abandoned.
    ///
    /// Fails only if the backend is unavailable or cannot run at all.
    pub fn run(&mut self, backend: &mut dyn RemovalBackend) -> ClearmarkResult<SessionReport> {
        let clock = RunClock::start();
        if !backend.is_available() {
            return Err(ClearmarkError::engine(format!(
                "removal backend '{}' is not available",
                backend.name()
            )));
        }

        let mut attempts = 0;
        loop {
            let active: Vec<usize> = (0..self.tracks.len())
                .filter(|&i| self.tracks[i].lifecycle.state() == TrackState::Synthesized)
                .collect();
            if active.is_empty() {
                break;
            }

            let job = self.job_for(&active);
            attempts += 1;
            tracing::info!(
                attempt = attempts,
                tracks = active.len(),
                backend = backend.name(),
                "Submitting removal job"
            );

            match backend.execute(&job)? {
                Execution::Completed => {
                    for &i in &active {
                        self.tracks[i].lifecycle.advance(TrackState::Executed)?;
                    }
                    break;
                }
                Execution::Rejected { track_ids, message } => {
                    let mut rejected: Vec<usize> = active
                        .iter()
                        .copied()
                        .filter(|&i| track_ids.contains(&self.tracks[i].track.id))
                        .collect();
                    if rejected.is_empty() {
                        tracing::warn!("Backend rejected the job without naming a submitted track");
                        rejected = active.clone();
                    }
                    let ambiguous = active.len() > 1 && rejected.len() == active.len();

                    let mut suspects = Vec::new();
                    for i in rejected {
                        if ambiguous && !self.tracks[i].lifecycle.can_retry() && !self.isolated[i] {
                            suspects.push(i);
                        } else {
                            self.handle_rejection(i, &message)?;
                        }
                    }

                    if !suspects.is_empty() && self.isolate(backend, &suspects, &mut attempts)? {
                        break;
                    }
                }
            }
        }

        let report = SessionReport {
            backend: backend.name().to_string(),
            started_at: clock.epoch_wall().to_string(),
            elapsed_ms: clock.elapsed_ms(),
            attempts,
            tracks: self
                .tracks
                .iter()
                .zip(&self.errors)
                .map(|(entry, error)| TrackOutcome {
                    track_id: entry.track.id,
                    state: entry.lifecycle.state(),
                    shape: entry.plan.shape,
                    segments: entry.plan.segments.len(),
                    retried: entry.lifecycle.retries() > 0,
                    error: error.clone(),
                })
                .collect(),
        };

        tracing::info!(
            attempts,
            executed = report.executed().len(),
            abandoned = report.abandoned().len(),
            elapsed_ms = report.elapsed_ms,
            "Removal session finished"
        );
        Ok(report)
    }

    fn job_for(&self, indices: &[usize]) -> RemovalJob {
        RemovalJob {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            frame: self.ctx.frame,
            plans: indices.iter().map(|&i| self.tracks[i].plan.clone()).collect(),
        }
    }

    /// Run each suspect track alone and abandon the ones refused on their own.
    ///
    /// Returns true when the last solo job completed and covers every track
    /// still active, so its output is already final.
    fn isolate(
        &mut self,
        backend: &mut dyn RemovalBackend,
        suspects: &[usize],
        attempts: &mut usize,
    ) -> ClearmarkResult<bool> {
        let mut last_completed = None;
        for &i in suspects {
            self.isolated[i] = true;
            let job = self.job_for(&[i]);
            *attempts += 1;
            tracing::info!(
                attempt = *attempts,
                track_id = self.tracks[i].track.id,
                "Submitting track alone to isolate a rejected job"
            );
            match backend.execute(&job)? {
                Execution::Completed => last_completed = Some(i),
                Execution::Rejected { message, .. } => {
                    last_completed = None;
                    self.handle_rejection(i, &message)?;
                }
            }
        }

        let remaining: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks[i].lifecycle.state() == TrackState::Synthesized)
            .collect();
        match (last_completed, remaining.as_slice()) {
            (Some(done), [only]) if done == *only => {
                self.tracks[done].lifecycle.advance(TrackState::Executed)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn handle_rejection(&mut self, index: usize, message: &str) -> ClearmarkResult<()> {
        let analyzer = self.analyzer;
        let entry = &mut self.tracks[index];
        let track_id = entry.track.id;

        if entry.lifecycle.can_retry() {
            tracing::warn!(track_id, reason = %message, "Plan rejected, retrying with blackout fallback");
            analyzer.replan_with_fallback(entry, &self.ctx)?;
        } else {
            entry.lifecycle.advance(TrackState::Abandoned)?;
            let err = ClearmarkError::plan_rejected(track_id, message);
            tracing::error!(track_id, error = %err, "Abandoning track after fallback was rejected");
            self.errors[index] = Some(err.to_string());
        }
        Ok(())
    }
}
