//! Clearmark Tracking Core
//!
//! Turns sparse per-sample watermark detections into executable removal plans:
//! - **Sampling:** Pick the timestamps to run the text detector on
//! - **Aggregation:** Group detections into persistent tracks
//! - **Movement:** Classify each track as static, moving, or complex
//! - **Validation:** Clamp every region strictly inside the frame
//! - **Planning:** Choose a removal method and plan shape per track
//! - **Synthesis:** Merge, bound, and emit time-gated removal segments
//!
//! This crate is pure computation: no I/O, no threads.
//! All inputs are data; all outputs are data.

pub mod aggregator;
pub mod heuristics;
pub mod movement;
pub mod pipeline;
pub mod planner;
pub mod sampler;
pub mod similarity;
pub mod synthesizer;
pub mod validator;

pub use aggregator::DetectionAggregator;
pub use heuristics::TextHeuristics;
pub use movement::MovementClassifier;
pub use pipeline::{PipelineConfig, WatermarkAnalyzer};
pub use planner::{PlanningContext, RemovalPlanner};
pub use sampler::FrameSampler;
pub use synthesizer::CommandSynthesizer;
pub use validator::validate;
