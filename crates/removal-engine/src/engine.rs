//! Removal backends: the boundary to the external media-transform engine.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::FrameDimensions;
use clearmark_timeline_model::plan::RemovalPlan;

use crate::filter_graph::{self, EncodeOptions};

/// One removal run over a single video.
#[derive(Debug, Clone)]
pub struct RemovalJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub frame: FrameDimensions,
    /// Plans in track order.
    pub plans: Vec<RemovalPlan>,
}

impl RemovalJob {
    pub fn track_ids(&self) -> Vec<u32> {
        self.plans.iter().map(|p| p.track_id).collect()
    }
}

/// Outcome of handing a job to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed,
    /// The engine refused the plans of these tracks.
    Rejected { track_ids: Vec<u32>, message: String },
}

/// Trait for removal backends (ffmpeg, test doubles).
pub trait RemovalBackend: Send {
    /// Apply every plan in the job and write the output video.
    ///
    /// A refused plan is an [`Execution::Rejected`]; `Err` is reserved for a
    /// backend that could not run at all.
    fn execute(&mut self, job: &RemovalJob) -> ClearmarkResult<Execution>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Runs the compiled filter graph through the ffmpeg binary.
///
/// ffmpeg reports a failed graph for the whole job, so a non-zero exit
/// rejects every track in it.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: String,
    encode: EncodeOptions,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            encode: EncodeOptions::default(),
        }
    }

    pub fn with_encode(mut self, encode: EncodeOptions) -> Self {
        self.encode = encode;
        self
    }

    pub fn build_args(&self, job: &RemovalJob) -> ClearmarkResult<Vec<String>> {
        let graph = filter_graph::compile(&job.plans, job.frame)?;
        tracing::debug!(stages = graph.stages, script = %graph.script, "Compiled filter graph");
        Ok(filter_graph::ffmpeg_args(
            &job.input_path,
            &job.output_path,
            &graph,
            &self.encode,
        ))
    }

    fn run_ffmpeg(&self, args: &[String]) -> ClearmarkResult<(bool, String)> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ClearmarkError::engine(format!("Failed to start ffmpeg: {e}")))?;
        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClearmarkError::engine("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClearmarkError::engine("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut out_time_secs = 0.0f64;
        loop {
            line.clear();
            let bytes = reader
                .read_line(&mut line)
                .map_err(|e| ClearmarkError::engine(format!("Failed reading ffmpeg progress: {e}")))?;
            if bytes == 0 {
                break;
            }
            if let Some((key, value)) = line.trim().split_once('=') {
                match key {
                    "out_time_us" | "out_time_ms" => {
                        if let Ok(us) = value.parse::<f64>() {
                            out_time_secs = us / 1_000_000.0;
                        }
                    }
                    "progress" => tracing::debug!(out_time_secs, state = value, "ffmpeg progress"),
                    _ => {}
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| ClearmarkError::engine(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        Ok((status.success(), stderr_tail(&stderr_output, 20)))
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl RemovalBackend for FfmpegBackend {
    fn execute(&mut self, job: &RemovalJob) -> ClearmarkResult<Execution> {
        if let Some(parent) = job.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = self.build_args(job)?;
        let started = std::time::Instant::now();
        let (success, stderr) = self.run_ffmpeg(&args)?;

        if !success {
            tracing::warn!(
                tracks = job.plans.len(),
                stderr = %stderr,
                "ffmpeg rejected the removal graph"
            );
            return Ok(Execution::Rejected {
                track_ids: job.track_ids(),
                message: stderr,
            });
        }

        tracing::info!(
            output = %job.output_path.display(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ffmpeg removal finished"
        );
        Ok(Execution::Completed)
    }

    fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg_path)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Frame size and duration of a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub frame: FrameDimensions,
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe the first video stream with ffprobe.
pub fn probe_video(ffprobe_path: &str, path: &Path) -> ClearmarkResult<VideoInfo> {
    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ClearmarkError::engine(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ClearmarkError::engine(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_output(json: &str) -> ClearmarkResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| ClearmarkError::invalid_input("no video stream found"))?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ClearmarkError::invalid_input("video stream has no frame size")),
    };
    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ClearmarkError::invalid_input("video has no usable duration"))?;

    Ok(VideoInfo {
        frame: FrameDimensions::new(width, height),
        duration_secs,
    })
}
