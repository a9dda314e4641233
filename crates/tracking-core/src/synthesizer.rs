//! Command synthesis: time-gated removal segments for moving tracks.
//!
//! # Algorithm
//!
//! 1. **Candidates:** one segment per consecutive detection pair, spanning
//!    `[t_i, t_{i+1}]` with the padded, validated box of detection `i`. The
//!    last detection covers the tail up to the track's end.
//! 2. **Merge:** adjacent segments whose regions differ by less than the
//!    tolerance collapse into one segment over their combined window.
//! 3. **Guard:** if more than `max_segments` remain, the segmented plan is
//!    replaced by the fallback, a single union region over the whole span.

use serde::{Deserialize, Serialize};

use clearmark_common::error::ClearmarkResult;
use clearmark_timeline_model::detection::FrameDimensions;
use clearmark_timeline_model::plan::{PlanShape, RemovalPlan, RemovalSegment};
use clearmark_timeline_model::track::{RemovalMethod, Track};

use crate::planner::{PlanningContext, TrackSpan};
use crate::validator::validate;

/// Shortest window emitted for a segment.
const MIN_WINDOW_SECS: f64 = 1e-6;

/// Configuration for the command synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Merge tolerance as a fraction of the frame dimension, per axis.
    pub merge_tolerance: f64,

    /// Maximum segments per track before falling back to a single region.
    pub max_segments: usize,

    /// Pixels added around each moving detection before validation.
    pub padding_px: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            merge_tolerance: 0.05,
            max_segments: 12,
            padding_px: 10,
        }
    }
}

/// Builds segmented plans for moving and complex tracks.
#[derive(Debug, Clone, Default)]
pub struct CommandSynthesizer {
    config: SynthesizerConfig,
}

impl CommandSynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    /// Synthesize a plan for a moving or complex track.
    ///
    /// Always returns at least one segment for a non-empty track.
    pub fn synthesize(
        &self,
        track: &Track,
        method: RemovalMethod,
        span: TrackSpan,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<RemovalPlan> {
        let padding = i64::from(self.config.padding_px);
        let fallback = fallback_segment(track, method, span, ctx.frame, padding)?;

        let candidates = self.candidate_segments(track, method, span, ctx.frame)?;
        let candidate_count = candidates.len();
        let merged = self.merge_segments(candidates, ctx.frame);

        if merged.is_empty() || merged.len() > self.config.max_segments {
            tracing::warn!(
                track_id = track.id,
                candidates = candidate_count,
                merged = merged.len(),
                max_segments = self.config.max_segments,
                "Segment plan too complex, substituting fallback region"
            );
            return Ok(RemovalPlan {
                track_id: track.id,
                shape: PlanShape::Fallback,
                segments: vec![fallback],
                fallback: Some(fallback),
            });
        }

        tracing::debug!(
            track_id = track.id,
            candidates = candidate_count,
            segments = merged.len(),
            "Synthesized segmented plan"
        );

        Ok(RemovalPlan {
            track_id: track.id,
            shape: PlanShape::Segmented,
            segments: merged,
            fallback: Some(fallback),
        })
    }

    /// One segment per consecutive detection pair, plus the tail segment.
    pub fn candidate_segments(
        &self,
        track: &Track,
        method: RemovalMethod,
        span: TrackSpan,
        frame: FrameDimensions,
    ) -> ClearmarkResult<Vec<RemovalSegment>> {
        let padding = i64::from(self.config.padding_px);
        let mut segments = Vec::with_capacity(track.len());

        for (i, detection) in track.detections.iter().enumerate() {
            let start_secs = detection.time_secs;
            let end_secs = match track.detections.get(i + 1) {
                Some(next) => next.time_secs,
                None => span.end_secs,
            };
            if end_secs - start_secs < MIN_WINDOW_SECS {
                continue;
            }
            segments.push(RemovalSegment {
                start_secs,
                end_secs,
                region: validate(&detection.bbox.padded(padding), frame)?,
                method,
            });
        }

        Ok(segments)
    }

    /// Merge adjacent segments whose regions are within tolerance.
    ///
    /// The merged segment spans exactly the union of both windows and covers
    /// both regions.
    pub fn merge_segments(
        &self,
        segments: Vec<RemovalSegment>,
        frame: FrameDimensions,
    ) -> Vec<RemovalSegment> {
        let tol_x = self.config.merge_tolerance * f64::from(frame.width);
        let tol_y = self.config.merge_tolerance * f64::from(frame.height);

        let mut merged: Vec<RemovalSegment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(current) = merged.last_mut() {
                if current.method == segment.method
                    && current.abuts(&segment)
                    && current.region.within_tolerance(&segment.region, tol_x, tol_y)
                {
                    current.end_secs = segment.end_secs;
                    current.region = current.region.union(&segment.region);
                    continue;
                }
            }
            merged.push(segment);
        }
        merged
    }
}

/// A single region covering every detection of the track over its whole span.
pub fn fallback_segment(
    track: &Track,
    method: RemovalMethod,
    span: TrackSpan,
    frame: FrameDimensions,
    padding: i64,
) -> ClearmarkResult<RemovalSegment> {
    let extent = track
        .extent()
        .map(|b| b.padded(padding))
        .unwrap_or_default();
    Ok(RemovalSegment {
        start_secs: span.start_secs,
        end_secs: span.end_secs,
        region: validate(&extent, frame)?,
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::EndExtension;
    use clearmark_timeline_model::detection::{BoundingBox, Detection};
    use clearmark_timeline_model::region::Region;

    const FRAME: FrameDimensions = FrameDimensions {
        width: 640,
        height: 480,
    };

    fn ctx() -> PlanningContext {
        PlanningContext {
            frame: FRAME,
            duration_secs: 5.0,
            sample_interval_secs: 1.0,
        }
    }

    fn track(positions: &[(f64, i64, i64)]) -> Track {
        Track::new(
            3,
            positions
                .iter()
                .map(|(t, x, y)| Detection {
                    time_secs: *t,
                    bbox: BoundingBox::new(*x, *y, 60, 20),
                    text: "mark".to_string(),
                    confidence: 0.9,
                    watermark_like: true,
                })
                .collect(),
        )
    }

    fn span(track: &Track) -> TrackSpan {
        TrackSpan::of(track, &ctx(), EndExtension::ToVideoEnd, 1.5).unwrap()
    }

    fn seg(start: f64, end: f64, region: Region) -> RemovalSegment {
        RemovalSegment {
            start_secs: start,
            end_secs: end,
            region,
            method: RemovalMethod::Delogo,
        }
    }

    #[test]
    fn test_linear_motion_covers_to_end_without_gaps() {
        let t = track(&[
            (0.0, 10, 200),
            (1.0, 107, 200),
            (2.0, 205, 200),
            (3.0, 302, 200),
            (4.0, 400, 200),
        ]);
        let plan = CommandSynthesizer::default()
            .synthesize(&t, RemovalMethod::Delogo, span(&t), &ctx())
            .unwrap();

        assert_eq!(plan.shape, PlanShape::Segmented);
        assert!(plan.segments.len() >= 2);
        assert_eq!(plan.segments[0].start_secs, 0.0);
        assert_eq!(plan.segments.last().unwrap().end_secs, 5.0);
        assert!(plan.segments.windows(2).all(|w| w[0].abuts(&w[1])));
        assert!(plan.check(FRAME).is_ok());
    }

    #[test]
    fn test_merge_spans_exact_union_of_windows() {
        let synthesizer = CommandSynthesizer::default();
        let merged = synthesizer.merge_segments(
            vec![
                seg(1.0, 2.5, Region::new(100, 100, 60, 20)),
                seg(2.5, 4.0, Region::new(110, 105, 62, 20)),
            ],
            FRAME,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_secs, 1.0);
        assert_eq!(merged[0].end_secs, 4.0);
        assert_eq!(merged[0].region, Region::new(100, 100, 72, 25));
    }

    #[test]
    fn test_distant_segments_stay_separate() {
        let merged = CommandSynthesizer::default().merge_segments(
            vec![
                seg(0.0, 1.0, Region::new(100, 100, 60, 20)),
                seg(1.0, 2.0, Region::new(300, 100, 60, 20)),
            ],
            FRAME,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_erratic_track_falls_back_to_union() {
        let positions: Vec<(f64, i64, i64)> = (0..20)
            .map(|i| {
                let x = if i % 2 == 0 { 20 } else { 500 };
                let y = if i % 3 == 0 { 30 } else { 400 };
                (i as f64 * 0.25, x, y)
            })
            .collect();
        let t = track(&positions);
        let plan = CommandSynthesizer::default()
            .synthesize(&t, RemovalMethod::Inpaint, span(&t), &ctx())
            .unwrap();

        assert_eq!(plan.shape, PlanShape::Fallback);
        assert_eq!(plan.segments.len(), 1);
        let region = plan.segments[0].region;
        // union of padded boxes: x 10..570, y 20..430
        assert_eq!(region, Region::new(10, 20, 560, 410));
        assert_eq!(plan.segments[0].start_secs, 0.0);
        assert_eq!(plan.segments[0].end_secs, 5.0);
    }

    #[test]
    fn test_segment_cap_is_respected() {
        let synthesizer = CommandSynthesizer::new(SynthesizerConfig {
            max_segments: 3,
            ..Default::default()
        });
        let t = track(&[(0.0, 0, 0), (1.0, 200, 0), (2.0, 400, 0), (3.0, 560, 0), (4.0, 0, 0)]);
        let plan = synthesizer
            .synthesize(&t, RemovalMethod::Blur, span(&t), &ctx())
            .unwrap();
        assert_eq!(plan.shape, PlanShape::Fallback);
        assert!(plan.segments.len() <= 3);
    }
}
