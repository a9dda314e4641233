//! Print the ffmpeg filter graph for recorded detections.

use std::path::PathBuf;

use clearmark_removal_engine::filter_graph;
use clearmark_tracking_core::pipeline::{PipelineConfig, WatermarkAnalyzer};

use crate::VideoArgs;

pub fn run(pipeline: PipelineConfig, detections: PathBuf, video: VideoArgs) -> anyhow::Result<()> {
    let analyzer = WatermarkAnalyzer::new(pipeline)?;
    let (analysis, ctx) = super::analyze_recorded(&analyzer, &detections, &video)?;

    let plans: Vec<_> = analysis.plans().cloned().collect();
    let graph = filter_graph::compile(&plans, ctx.frame)?;

    eprintln!(
        "Compiled {} stages for {} tracks",
        graph.stages,
        plans.len()
    );
    println!("{}", graph.script);
    Ok(())
}
