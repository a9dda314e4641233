//! Removal planning: method selection and plan shape per track.
//!
//! Static tracks get one region for their whole span. Moving and complex
//! tracks are handed to the [`CommandSynthesizer`] for time-gated segments.
//!
//! Sampling does not cover every frame, so a track whose last detection
//! falls in the final sample is assumed to persist to the end of the video
//! (see [`EndExtension`]).

use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::FrameDimensions;
use clearmark_timeline_model::plan::{PlanShape, RemovalPlan, RemovalSegment};
use clearmark_timeline_model::region::Region;
use clearmark_timeline_model::track::{RemovalMethod, Track};

use crate::heuristics::TextHeuristics;
use crate::sampler::SamplePlan;
use crate::synthesizer::{fallback_segment, CommandSynthesizer};
use crate::validator::validate;

/// How far a track reaching the final sample is extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndExtension {
    /// Persist to the end of the video.
    #[default]
    ToVideoEnd,
    /// Persist for at most one more sampling interval.
    OneInterval,
}

/// Configuration for the removal planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub end_extension: EndExtension,

    /// A track ending within this many intervals of the video end counts as
    /// reaching the sampling boundary.
    pub boundary_slack_intervals: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            end_extension: EndExtension::ToVideoEnd,
            boundary_slack_intervals: 1.5,
        }
    }
}

/// Per-video facts the planner needs beyond the track itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanningContext {
    pub frame: FrameDimensions,
    pub duration_secs: f64,
    pub sample_interval_secs: f64,
}

impl PlanningContext {
    pub fn new(frame: FrameDimensions, samples: &SamplePlan) -> Self {
        Self {
            frame,
            duration_secs: samples.duration_secs,
            sample_interval_secs: samples.interval_secs,
        }
    }
}

/// Time window a track's plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackSpan {
    /// First detection time.
    pub start_secs: f64,
    /// Last detection time.
    pub last_secs: f64,
    /// End of the plan window; always greater than `start_secs`.
    pub end_secs: f64,
}

impl TrackSpan {
    /// Compute the span of a non-empty track.
    pub fn of(
        track: &Track,
        ctx: &PlanningContext,
        extension: EndExtension,
        boundary_slack_intervals: f64,
    ) -> Option<TrackSpan> {
        let start_secs = track.first_time()?;
        let last_secs = track.last_time()?;
        let step = if ctx.sample_interval_secs > 0.0 {
            ctx.sample_interval_secs
        } else {
            1.0
        };

        let reaches_boundary =
            ctx.duration_secs - last_secs <= boundary_slack_intervals * step + 1e-9;
        let extended = if reaches_boundary {
            match extension {
                EndExtension::ToVideoEnd => ctx.duration_secs,
                EndExtension::OneInterval => (last_secs + step).min(ctx.duration_secs),
            }
        } else {
            last_secs
        };

        let mut end_secs = extended.max(last_secs);
        if end_secs <= start_secs {
            // a lone observation still gets one interval of coverage
            end_secs = (start_secs + step).min(ctx.duration_secs);
            if end_secs <= start_secs {
                end_secs = start_secs + step;
            }
        }

        Some(TrackSpan {
            start_secs,
            last_secs,
            end_secs,
        })
    }
}

/// Chooses methods and plan shapes for classified tracks.
#[derive(Debug, Clone, Default)]
pub struct RemovalPlanner {
    config: PlannerConfig,
    synthesizer: CommandSynthesizer,
}

impl RemovalPlanner {
    pub fn new(config: PlannerConfig, synthesizer: CommandSynthesizer) -> Self {
        Self {
            config,
            synthesizer,
        }
    }

    pub fn synthesizer(&self) -> &CommandSynthesizer {
        &self.synthesizer
    }

    /// First matching rule wins: URL or legal mark, any text, no text.
    /// Tracks whose boxes are all degenerate fall through to blackout.
    pub fn select_method(&self, track: &Track, heuristics: &TextHeuristics) -> RemovalMethod {
        if track.detections.iter().all(|d| d.bbox.is_degenerate()) {
            return RemovalMethod::Blackout;
        }

        let url_or_legal = std::iter::once(track.representative_text.as_str())
            .chain(track.detections.iter().map(|d| d.text.as_str()))
            .any(|text| heuristics.is_url_like(text) || heuristics.has_legal_mark(text));

        if url_or_legal {
            RemovalMethod::Delogo
        } else if !track.representative_text.is_empty() {
            RemovalMethod::Inpaint
        } else {
            RemovalMethod::Blur
        }
    }

    /// The most frequent validated region, ties broken by confidence then time.
    pub fn representative_region(
        &self,
        track: &Track,
        frame: FrameDimensions,
    ) -> ClearmarkResult<Option<Region>> {
        let mut tally: Vec<(Region, usize, f64)> = Vec::new();
        for detection in &track.detections {
            let region = validate(&detection.bbox, frame)?;
            match tally.iter_mut().find(|(r, _, _)| *r == region) {
                Some((_, count, confidence)) => {
                    *count += 1;
                    *confidence = confidence.max(detection.confidence);
                }
                None => tally.push((region, 1, detection.confidence)),
            }
        }

        let mut best: Option<(Region, usize, f64)> = None;
        for entry in tally {
            let better = match best {
                None => true,
                Some((_, count, confidence)) => {
                    entry.1 > count || (entry.1 == count && entry.2 > confidence)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        Ok(best.map(|(region, _, _)| region))
    }

    pub fn span(&self, track: &Track, ctx: &PlanningContext) -> Option<TrackSpan> {
        TrackSpan::of(
            track,
            ctx,
            self.config.end_extension,
            self.config.boundary_slack_intervals,
        )
    }

    /// Plan a classified track and record its method.
    ///
    /// Returns `None` for a track with no detections.
    pub fn plan(
        &self,
        track: &mut Track,
        heuristics: &TextHeuristics,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<Option<RemovalPlan>> {
        let movement = track.movement().ok_or_else(|| {
            ClearmarkError::track(format!("track {} must be classified before planning", track.id))
        })?;
        let Some(span) = self.span(track, ctx) else {
            return Ok(None);
        };

        let method = self.select_method(track, heuristics);
        track.set_method(method)?;

        tracing::debug!(
            track_id = track.id,
            text = %track.representative_text,
            ?movement,
            method = method.as_str(),
            "Selected removal method"
        );

        if !movement.is_static() {
            return self.synthesizer.synthesize(track, method, span, ctx).map(Some);
        }

        let Some(region) = self.representative_region(track, ctx.frame)? else {
            return Ok(None);
        };
        let segment = RemovalSegment {
            start_secs: span.start_secs,
            end_secs: span.end_secs,
            region,
            method,
        };
        let fallback = fallback_segment(track, method, span, ctx.frame, 0)?;

        Ok(Some(RemovalPlan {
            track_id: track.id,
            shape: PlanShape::Static,
            segments: vec![segment],
            fallback: Some(fallback),
        }))
    }

    /// Re-plan a rejected track as a single blackout region with no further fallback.
    pub fn plan_forced_fallback(
        &self,
        track: &Track,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<RemovalPlan> {
        let span = self.span(track, ctx).ok_or_else(|| {
            ClearmarkError::track(format!("track {} has no detections to re-plan", track.id))
        })?;
        let padding = match track.movement() {
            Some(movement) if !movement.is_static() => {
                i64::from(self.synthesizer.config().padding_px)
            }
            _ => 0,
        };
        let segment = fallback_segment(track, RemovalMethod::Blackout, span, ctx.frame, padding)?;

        Ok(RemovalPlan {
            track_id: track.id,
            shape: PlanShape::Fallback,
            segments: vec![segment],
            fallback: None,
        })
    }
}
