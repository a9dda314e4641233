//! Compile removal plans into an ffmpeg `-filter_complex` graph.
//!
//! Every segment becomes one time-gated stage. Within a plan the gates are
//! half-open, `enable='gte(t,start)*lt(t,end)'`, so abutting segments never
//! share a frame; a plan's last segment uses the closed
//! `enable='between(t,start,end)'` to reach its end time. Stages are chained in track order, then segment order, from `[0:v]` to
//! `[vout]`:
//!
//! ```text
//! [0:v] ─ stage 0 ─ [s0] ─ stage 1 ─ [s1] ─ ... ─ stage n-1 ─ [vout]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use clearmark_common::clock::format_filter_secs;
use clearmark_common::error::ClearmarkResult;
use clearmark_timeline_model::detection::FrameDimensions;
use clearmark_timeline_model::plan::{RemovalPlan, RemovalSegment};
use clearmark_timeline_model::track::RemovalMethod;

pub const INPUT_LABEL: &str = "0:v";
pub const OUTPUT_LABEL: &str = "vout";

const MAX_BOXBLUR_RADIUS: u32 = 10;
const INPAINT_SIGMA: f64 = 8.0;

/// A compiled filter graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    pub script: String,
    /// Number of time-gated stages.
    pub stages: usize,
}

/// Encoder settings for the re-encoded video stream. Audio is copied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 18,
        }
    }
}

/// Compile `plans` for a video of `frame` size.
///
/// Every plan is checked against the frame first, so a graph is only built
/// from frame-safe regions.
pub fn compile(plans: &[RemovalPlan], frame: FrameDimensions) -> ClearmarkResult<FilterGraph> {
    for plan in plans {
        plan.check(frame)?;
    }

    let segments: Vec<(&RemovalSegment, bool)> = plans
        .iter()
        .flat_map(|p| {
            let last = p.segments.len().saturating_sub(1);
            p.segments.iter().enumerate().map(move |(i, s)| (s, i == last))
        })
        .collect();
    if segments.is_empty() {
        return Ok(FilterGraph {
            script: format!("[{INPUT_LABEL}]null[{OUTPUT_LABEL}]"),
            stages: 0,
        });
    }

    let mut chains = Vec::with_capacity(segments.len());
    let mut input = INPUT_LABEL.to_string();
    for (index, &(segment, closes_plan)) in segments.iter().enumerate() {
        let output = if index + 1 == segments.len() {
            OUTPUT_LABEL.to_string()
        } else {
            format!("s{index}")
        };
        chains.push(render_stage(index, segment, closes_plan, &input, &output));
        input = output;
    }

    Ok(FilterGraph {
        script: chains.join(";"),
        stages: segments.len(),
    })
}

fn enable_expr(segment: &RemovalSegment, closes_plan: bool) -> String {
    let start = format_filter_secs(segment.start_secs);
    let end = format_filter_secs(segment.end_secs);
    if closes_plan {
        format!("enable='between(t,{start},{end})'")
    } else {
        format!("enable='gte(t,{start})*lt(t,{end})'")
    }
}

fn render_stage(
    index: usize,
    segment: &RemovalSegment,
    closes_plan: bool,
    input: &str,
    output: &str,
) -> String {
    let region = segment.region;
    let (x, y, w, h) = (region.x, region.y, region.w, region.h);
    let enable = enable_expr(segment, closes_plan);

    match segment.method {
        RemovalMethod::Delogo => {
            format!("[{input}]delogo=x={x}:y={y}:w={w}:h={h}:{enable}[{output}]")
        }
        RemovalMethod::Blur => {
            // chroma planes are half size in yuv420p
            let luma = (w.min(h) / 2).min(MAX_BOXBLUR_RADIUS);
            let chroma = (w.min(h) / 4).min(MAX_BOXBLUR_RADIUS);
            patch_stage(
                index,
                input,
                output,
                &format!("crop={w}:{h}:{x}:{y},boxblur=luma_radius={luma}:chroma_radius={chroma}"),
                x,
                y,
                &enable,
            )
        }
        RemovalMethod::Inpaint => patch_stage(
            index,
            input,
            output,
            &format!("crop={w}:{h}:{x}:{y},gblur=sigma={INPAINT_SIGMA}"),
            x,
            y,
            &enable,
        ),
        RemovalMethod::Blackout => format!(
            "[{input}]drawbox=x={x}:y={y}:w={w}:h={h}:color=black:t=fill:{enable}[{output}]"
        ),
    }
}

/// Split the stream, filter a cropped patch, and overlay it back in place.
fn patch_stage(
    index: usize,
    input: &str,
    output: &str,
    patch_filter: &str,
    x: u32,
    y: u32,
    enable: &str,
) -> String {
    format!(
        "[{input}]split[s{index}base][s{index}src];\
         [s{index}src]{patch_filter}[s{index}patch];\
         [s{index}base][s{index}patch]overlay={x}:{y}:{enable}[{output}]"
    )
}

/// Full ffmpeg argument list for applying `graph` to `input`.
pub fn ffmpeg_args(
    input: &Path,
    output: &Path,
    graph: &FilterGraph,
    encode: &EncodeOptions,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-filter_complex".to_string(),
        graph.script.clone(),
        "-map".to_string(),
        format!("[{OUTPUT_LABEL}]"),
        "-map".to_string(),
        "0:a?".to_string(),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-preset".to_string(),
        encode.preset.clone(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        output.display().to_string(),
    ]
}
