pub mod apply;
pub mod filter;
pub mod plan;
pub mod sample;

use std::path::Path;

use clearmark_timeline_model::detection::{parse_recorded_detections, FrameDimensions, RecordedDetection};
use clearmark_tracking_core::pipeline::{Analysis, PipelineConfig, WatermarkAnalyzer};
use clearmark_tracking_core::planner::PlanningContext;
use clearmark_tracking_core::sampler::SamplePlan;

use crate::VideoArgs;

pub fn load_pipeline_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load pipeline config: {e}")),
        None => Ok(PipelineConfig::default()),
    }
}

pub fn load_recorded(path: &Path) -> anyhow::Result<Vec<RecordedDetection>> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| anyhow::anyhow!("Detections file not found: {}", path.display()))?;
    parse_recorded_detections(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse detections: {e}"))
}

/// Sample plan for a video, honouring an explicit sample count.
pub fn sample_plan(
    analyzer: &WatermarkAnalyzer,
    duration_secs: f64,
    samples: Option<usize>,
) -> anyhow::Result<SamplePlan> {
    let plan = match samples {
        Some(count) => analyzer.sampler().plan_with_count(duration_secs, count)?,
        None => analyzer.sampler().plan(duration_secs)?,
    };
    Ok(plan)
}

/// Analyze recorded detections for the video described by `video`.
pub fn analyze_recorded(
    analyzer: &WatermarkAnalyzer,
    detections_path: &Path,
    video: &VideoArgs,
) -> anyhow::Result<(Analysis, PlanningContext)> {
    let samples = sample_plan(analyzer, video.duration, video.samples)?;
    let ctx = PlanningContext::new(FrameDimensions::new(video.width, video.height), &samples);

    let records = load_recorded(detections_path)?;
    tracing::info!(
        records = records.len(),
        interval_secs = samples.interval_secs,
        "Loaded recorded detections"
    );
    let detections = analyzer.annotate_recorded(records);
    let analysis = analyzer.analyze(detections, &ctx)?;
    Ok((analysis, ctx))
}
