//! End-to-end analysis: detections in, removal plans out.
//!
//! [`WatermarkAnalyzer`] runs aggregation, classification, validation,
//! planning, and synthesis in order for every track, and advances each
//! track's [`TrackLifecycle`] as it goes. It runs only after all sampled
//! detections for the video are available.

use std::path::Path;

use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::{Detection, RecordedDetection};
use clearmark_timeline_model::plan::{RemovalPlan, TrackLifecycle, TrackState};
use clearmark_timeline_model::track::Track;

use crate::aggregator::{AggregationReport, AggregatorConfig, DetectionAggregator};
use crate::heuristics::{TextHeuristics, TextHeuristicsConfig};
use crate::movement::{MovementAnalysis, MovementClassifier, MovementConfig};
use crate::planner::{PlannerConfig, PlanningContext, RemovalPlanner};
use crate::sampler::{FrameSampler, SamplerConfig};
use crate::synthesizer::{CommandSynthesizer, SynthesizerConfig};

/// Every tunable of the analysis pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampler: SamplerConfig,
    pub heuristics: TextHeuristicsConfig,
    pub aggregator: AggregatorConfig,
    pub movement: MovementConfig,
    pub planner: PlannerConfig,
    pub synthesizer: SynthesizerConfig,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> ClearmarkResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClearmarkError::config(format!("invalid pipeline config: {e}")))
    }

    pub fn from_file(path: &Path) -> ClearmarkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ClearmarkError::config(format!("invalid pipeline config {}: {e}", path.display()))
        })
    }
}

/// One track with its classification, plan, and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedTrack {
    pub track: Track,
    pub analysis: MovementAnalysis,
    pub plan: RemovalPlan,
    pub lifecycle: TrackLifecycle,
}

/// Result of analyzing one video's detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Planned tracks in first-appearance order.
    pub tracks: Vec<AnalyzedTrack>,
    pub report: AggregationReport,
}

impl Analysis {
    pub fn plans(&self) -> impl Iterator<Item = &RemovalPlan> {
        self.tracks.iter().map(|t| &t.plan)
    }

    pub fn segment_count(&self) -> usize {
        self.plans().map(|p| p.segments.len()).sum()
    }
}

/// Compiled pipeline, reusable across videos.
#[derive(Debug, Clone)]
pub struct WatermarkAnalyzer {
    heuristics: TextHeuristics,
    sampler: FrameSampler,
    aggregator: DetectionAggregator,
    classifier: MovementClassifier,
    planner: RemovalPlanner,
}

impl WatermarkAnalyzer {
    /// Compile the heuristic tables and build every stage.
    pub fn new(config: PipelineConfig) -> ClearmarkResult<Self> {
        let heuristics = TextHeuristics::compile(&config.heuristics)?;
        Ok(Self {
            heuristics,
            sampler: FrameSampler::new(config.sampler),
            aggregator: DetectionAggregator::new(config.aggregator),
            classifier: MovementClassifier::new(config.movement),
            planner: RemovalPlanner::new(
                config.planner,
                CommandSynthesizer::new(config.synthesizer),
            ),
        })
    }

    pub fn with_defaults() -> ClearmarkResult<Self> {
        Self::new(PipelineConfig::default())
    }

    pub fn heuristics(&self) -> &TextHeuristics {
        &self.heuristics
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    pub fn planner(&self) -> &RemovalPlanner {
        &self.planner
    }

    /// Annotate recorded detector output.
    pub fn annotate_recorded(&self, records: Vec<RecordedDetection>) -> Vec<Detection> {
        records
            .into_iter()
            .map(|r| self.heuristics.annotate(r.time_secs, r.raw))
            .collect()
    }

    /// Turn a complete detection set into one plan per track.
    ///
    /// Tracks that end up with no detections produce no plan.
    pub fn analyze(
        &self,
        detections: Vec<Detection>,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<Analysis> {
        if !ctx.frame.can_hold_region() {
            return Err(ClearmarkError::degenerate_frame(
                ctx.frame.width,
                ctx.frame.height,
            ));
        }
        if !ctx.duration_secs.is_finite() || ctx.duration_secs <= 0.0 {
            return Err(ClearmarkError::invalid_input(format!(
                "video duration must be positive, got {}",
                ctx.duration_secs
            )));
        }

        let (tracks, report) =
            self.aggregator
                .aggregate(detections, ctx.sample_interval_secs, &self.heuristics);

        let mut analyzed = Vec::with_capacity(tracks.len());
        for track in tracks {
            match self.analyze_track(track, ctx)? {
                Some(entry) => analyzed.push(entry),
                None => tracing::debug!("Dropped track with no usable detections"),
            }
        }

        tracing::info!(
            tracks = analyzed.len(),
            segments = analyzed.iter().map(|t| t.plan.segments.len()).sum::<usize>(),
            "Analysis complete"
        );

        Ok(Analysis {
            tracks: analyzed,
            report,
        })
    }

    fn analyze_track(
        &self,
        mut track: Track,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<Option<AnalyzedTrack>> {
        if track.is_empty() {
            return Ok(None);
        }
        let mut lifecycle = TrackLifecycle::new(track.id);

        let analysis = self.classifier.classify(&track, ctx.frame);
        track.set_movement(analysis.movement)?;
        lifecycle.advance(TrackState::Classified)?;

        if self.planner.representative_region(&track, ctx.frame)?.is_none() {
            return Ok(None);
        }
        lifecycle.advance(TrackState::Validated)?;

        let Some(plan) = self.planner.plan(&mut track, &self.heuristics, ctx)? else {
            return Ok(None);
        };
        lifecycle.advance(TrackState::Planned)?;

        plan.check(ctx.frame)?;
        lifecycle.advance(TrackState::Synthesized)?;

        tracing::info!(
            track_id = track.id,
            text = %track.representative_text,
            detections = track.len(),
            shape = ?plan.shape,
            segments = plan.segments.len(),
            "Planned track removal"
        );

        Ok(Some(AnalyzedTrack {
            track,
            analysis,
            plan,
            lifecycle,
        }))
    }

    /// Re-plan a rejected track once, as a forced blackout over its union region.
    ///
    /// Fails if the track already used its retry.
    pub fn replan_with_fallback(
        &self,
        entry: &mut AnalyzedTrack,
        ctx: &PlanningContext,
    ) -> ClearmarkResult<()> {
        entry.lifecycle.advance(TrackState::Planned)?;
        let plan = self.planner.plan_forced_fallback(&entry.track, ctx)?;
        plan.check(ctx.frame)?;
        entry.plan = plan;
        entry.lifecycle.advance(TrackState::Synthesized)?;

        tracing::warn!(
            track_id = entry.track.id,
            "Re-planned rejected track as blackout fallback"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearmark_timeline_model::detection::{BoundingBox, FrameDimensions};
    use clearmark_timeline_model::plan::PlanShape;
    use clearmark_timeline_model::region::Region;
    use clearmark_timeline_model::track::{MotionAxis, Movement, RemovalMethod};
    use proptest::prelude::*;

    const FRAME: FrameDimensions = FrameDimensions {
        width: 640,
        height: 480,
    };

    fn ctx(duration_secs: f64, sample_interval_secs: f64) -> PlanningContext {
        PlanningContext {
            frame: FRAME,
            duration_secs,
            sample_interval_secs,
        }
    }

    fn det(t: f64, x: i64, y: i64, w: i64, h: i64, text: &str) -> Detection {
        Detection {
            time_secs: t,
            bbox: BoundingBox::new(x, y, w, h),
            text: text.to_string(),
            confidence: 0.9,
            watermark_like: false,
        }
    }

    #[test]
    fn test_static_corner_logo() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let analysis = analyzer
            .analyze(vec![det(0.0, 448, 336, 192, 144, "")], &ctx(10.0, 2.0))
            .unwrap();

        assert_eq!(analysis.tracks.len(), 1);
        let entry = &analysis.tracks[0];
        assert_eq!(entry.analysis.movement, Movement::Static);
        assert_eq!(entry.plan.shape, PlanShape::Static);
        assert_eq!(entry.plan.segments[0].region, Region::new(448, 336, 191, 143));
        assert_eq!(entry.lifecycle.state(), TrackState::Synthesized);
    }

    #[test]
    fn test_linear_motion_is_segmented_to_video_end() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let detections = (0..5)
            .map(|i| det(i as f64, 10 + (390 * i) / 4, 200, 60, 20, "Follow @brand"))
            .collect();
        let analysis = analyzer.analyze(detections, &ctx(5.0, 1.0)).unwrap();

        assert_eq!(analysis.tracks.len(), 1);
        let entry = &analysis.tracks[0];
        assert_eq!(
            entry.analysis.movement,
            Movement::Moving {
                axis: MotionAxis::Horizontal
            }
        );
        assert_eq!(entry.plan.shape, PlanShape::Segmented);
        assert!(entry.plan.segments.len() >= 2);
        assert_eq!(entry.plan.span(), Some((0.0, 5.0)));
        assert!(entry.plan.segments.windows(2).all(|w| w[0].abuts(&w[1])));
    }

    #[test]
    fn test_erratic_track_uses_fallback() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let detections = (0..20)
            .map(|i| {
                let x = if i % 2 == 0 { 20 } else { 500 };
                let y = if i % 3 == 0 { 30 } else { 400 };
                det(i as f64 * 0.25, x, y, 60, 20, "CHANNEL LOGO")
            })
            .collect();
        let analysis = analyzer.analyze(detections, &ctx(5.0, 0.25)).unwrap();

        assert_eq!(analysis.tracks.len(), 1);
        let plan = &analysis.tracks[0].plan;
        assert_eq!(plan.shape, PlanShape::Fallback);
        assert_eq!(plan.segments.len(), 1);
    }

    #[test]
    fn test_low_confidence_track_is_dropped() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let mut weak = det(0.0, 10, 10, 50, 20, "www.site.tv");
        weak.confidence = 0.1;
        let analysis = analyzer.analyze(vec![weak], &ctx(10.0, 2.0)).unwrap();
        assert!(analysis.tracks.is_empty());
        assert_eq!(analysis.report.low_confidence, 1);
    }

    #[test]
    fn test_duplicate_observations_yield_one_plan() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let detections = (0..3)
            .flat_map(|i| {
                let t = i as f64 * 2.0;
                [det(t, 500, 20, 100, 30, "www.site.tv"), det(t, 500, 20, 100, 30, "www.site.tv")]
            })
            .collect();
        let analysis = analyzer.analyze(detections, &ctx(6.0, 2.0)).unwrap();

        assert_eq!(analysis.tracks.len(), 1);
        assert_eq!(analysis.report.duplicates, 3);
        assert_eq!(analysis.segment_count(), 1);
    }

    #[test]
    fn test_extreme_detector_boxes_are_clamped() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let detections = vec![
            det(0.0, i64::MAX - 10, 0, 100, 20, ""),
            det(2.0, i64::MAX - 10, 0, 100, 20, ""),
        ];
        let analysis = analyzer.analyze(detections, &ctx(4.0, 2.0)).unwrap();

        assert_eq!(analysis.tracks.len(), 1);
        for entry in &analysis.tracks {
            assert!(entry.plan.check(FRAME).is_ok());
        }
    }

    #[test]
    fn test_degenerate_frame_is_rejected() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let ctx = PlanningContext {
            frame: FrameDimensions::new(2, 2),
            duration_secs: 5.0,
            sample_interval_secs: 1.0,
        };
        let err = analyzer.analyze(vec![], &ctx).unwrap_err();
        assert!(matches!(err, ClearmarkError::DegenerateFrame { .. }));
    }

    #[test]
    fn test_replan_with_fallback_only_once() {
        let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
        let ctx = ctx(10.0, 2.0);
        let mut analysis = analyzer
            .analyze(
                vec![det(0.0, 10, 10, 80, 20, "www.site.tv"), det(2.0, 10, 10, 80, 20, "www.site.tv")],
                &ctx,
            )
            .unwrap();
        let entry = &mut analysis.tracks[0];

        analyzer.replan_with_fallback(entry, &ctx).unwrap();
        assert_eq!(entry.plan.shape, PlanShape::Fallback);
        assert_eq!(entry.plan.segments[0].method, RemovalMethod::Blackout);
        assert_eq!(entry.lifecycle.retries(), 1);

        assert!(analyzer.replan_with_fallback(entry, &ctx).is_err());
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "synthesizer": { "max_segments": 4 }, "planner": { "end_extension": "one_interval" } }"#,
        )
        .unwrap();
        assert_eq!(config.synthesizer.max_segments, 4);
        assert_eq!(config.synthesizer.padding_px, 10);
        assert_eq!(config.aggregator.iou_threshold, 0.3);
        assert_eq!(
            config.planner.end_extension,
            crate::planner::EndExtension::OneInterval
        );
    }

    #[test]
    fn test_config_rejects_bad_json() {
        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ClearmarkError::Config { .. }));
    }

    fn arb_detections() -> impl Strategy<Value = Vec<Detection>> {
        prop::collection::vec((-50i64..700, -50i64..520, 1i64..300, 1i64..200), 1..30).prop_map(
            |boxes| {
                boxes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (x, y, w, h))| det(i as f64, x, y, w, h, "brand.tv"))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_every_track_gets_a_valid_bounded_plan(detections in arb_detections()) {
            let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
            let duration = detections.len() as f64 + 1.0;
            let analysis = analyzer.analyze(detections, &ctx(duration, 1.0)).unwrap();

            prop_assert_eq!(analysis.tracks.len(), 1);
            for entry in &analysis.tracks {
                prop_assert!(!entry.plan.segments.is_empty());
                prop_assert!(entry.plan.segments.len() <= 12);
                prop_assert!(entry.plan.check(FRAME).is_ok());
            }
        }

        #[test]
        fn prop_analysis_is_deterministic(detections in arb_detections()) {
            let analyzer = WatermarkAnalyzer::with_defaults().unwrap();
            let duration = detections.len() as f64 + 1.0;
            let first = analyzer.analyze(detections.clone(), &ctx(duration, 1.0)).unwrap();
            let second = analyzer.analyze(detections, &ctx(duration, 1.0)).unwrap();

            prop_assert_eq!(first.tracks.len(), second.tracks.len());
            for (a, b) in first.tracks.iter().zip(&second.tracks) {
                prop_assert_eq!(a.analysis.movement, b.analysis.movement);
                prop_assert_eq!(&a.plan, &b.plan);
            }
        }
    }
}
