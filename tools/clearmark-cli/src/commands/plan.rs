//! Build removal plans from recorded detections.

use std::path::PathBuf;

use clearmark_tracking_core::pipeline::{PipelineConfig, WatermarkAnalyzer};

use crate::VideoArgs;

pub fn run(pipeline: PipelineConfig, detections: PathBuf, video: VideoArgs) -> anyhow::Result<()> {
    let analyzer = WatermarkAnalyzer::new(pipeline)?;
    let (analysis, _) = super::analyze_recorded(&analyzer, &detections, &video)?;

    eprintln!(
        "Planned {} tracks ({} segments) from {} detections ({} low confidence, {} noise)",
        analysis.tracks.len(),
        analysis.segment_count(),
        analysis.report.input,
        analysis.report.low_confidence,
        analysis.report.noise,
    );
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
