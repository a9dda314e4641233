//! Remove watermarks from a video with ffmpeg.

use std::path::PathBuf;

use clearmark_common::config::AppConfig;
use clearmark_removal_engine::collector::ReplayDetector;
use clearmark_removal_engine::engine::probe_video;
use clearmark_removal_engine::{CancelToken, DetectionCollector, FfmpegBackend, RemovalSession};
use clearmark_tracking_core::pipeline::{PipelineConfig, WatermarkAnalyzer};
use clearmark_tracking_core::planner::PlanningContext;

pub async fn run(
    pipeline: PipelineConfig,
    app_config: &AppConfig,
    input: PathBuf,
    detections: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    println!("Removing watermarks from: {}", input.display());

    let info = probe_video(&app_config.engine.ffprobe_path, &input)?;
    println!(
        "  Video: {}x{}, {:.2}s",
        info.frame.width, info.frame.height, info.duration_secs
    );

    let analyzer = WatermarkAnalyzer::new(pipeline)?;
    let sample_count = match app_config.engine.sample_count {
        0 => None,
        n => Some(n),
    };
    let samples = super::sample_plan(&analyzer, info.duration_secs, sample_count)?;

    let records = super::load_recorded(&detections)?;
    let detector = ReplayDetector::new(records, samples.interval_secs / 2.0);
    let collector = DetectionCollector::new(detector, app_config.engine.detection_concurrency);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let collection = collector
        .collect(&samples, analyzer.heuristics(), &cancel)
        .await?;
    println!(
        "  Collected {} detections from {} samples ({} failed)",
        collection.report.detections, collection.report.samples, collection.report.failed
    );

    let ctx = PlanningContext::new(info.frame, &samples);
    let analysis = analyzer.analyze(collection.detections, &ctx)?;
    if analysis.tracks.is_empty() {
        println!("  No watermark tracks found; nothing to remove.");
        return Ok(());
    }
    println!(
        "  Planned {} tracks ({} segments)",
        analysis.tracks.len(),
        analysis.segment_count()
    );

    let mut backend = FfmpegBackend::new(app_config.engine.ffmpeg_path.as_str());
    let mut session = RemovalSession::new(&analyzer, ctx, analysis, input, output.clone());
    let report = session.run(&mut backend)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.executed().is_empty() {
        anyhow::bail!("every track was rejected by {}", report.backend);
    }
    if !report.abandoned().is_empty() {
        println!("  Abandoned tracks: {:?}", report.abandoned());
    }
    println!("\nRemoval complete: {}", output.display());
    Ok(())
}
