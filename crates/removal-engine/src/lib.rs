//! Clearmark Removal Engine
//!
//! Boundary adapters around the pure tracking core: collecting detections
//! from an external text detector, compiling removal plans into an ffmpeg
//! filter graph, and running that graph with per-track retry.
//!
//! # Pipeline Architecture
//!
//! ```text
//! video ──┬── SamplePlan ── DetectionCollector (bounded pool) ──┐
//!         │                                                     ▼
//!         │                                          WatermarkAnalyzer
//!         │                                                     │
//!         │                                              RemovalPlan[]
//!         │                                                     ▼
//!         └──────────────────────────── filter_graph::compile ──┤
//!                                                               ▼
//!                                       RemovalSession ── RemovalBackend (ffmpeg)
//!                                                               │
//!                                                               ▼
//!                                                          output.mp4
//! ```

pub mod collector;
pub mod engine;
pub mod filter_graph;
pub mod session;

pub use collector::{CancelToken, DetectionCollector, TextDetector};
pub use engine::{Execution, FfmpegBackend, RemovalBackend, RemovalJob};
pub use filter_graph::FilterGraph;
pub use session::{RemovalSession, SessionReport};
