//! Print the sample timestamps for a video.

use clearmark_tracking_core::pipeline::PipelineConfig;
use clearmark_tracking_core::sampler::{FrameSampler, SamplerConfig};

pub fn run(
    pipeline: PipelineConfig,
    duration: f64,
    count: Option<usize>,
    interval: Option<f64>,
) -> anyhow::Result<()> {
    let config = SamplerConfig {
        target_interval_secs: interval.unwrap_or(pipeline.sampler.target_interval_secs),
        ..pipeline.sampler
    };
    let sampler = FrameSampler::new(config);

    let plan = match count {
        Some(count) => sampler.plan_with_count(duration, count)?,
        None => sampler.plan(duration)?,
    };

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
