//! Movement classification for tracks.
//!
//! Box centers are normalized by the frame dimensions, so variances are in
//! fractional-frame units and comparable across resolutions.

use serde::{Deserialize, Serialize};

use clearmark_timeline_model::detection::FrameDimensions;
use clearmark_timeline_model::track::{MotionAxis, Movement, Track};

/// Configuration for the movement classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Per-axis normalized variance below which an axis counts as still.
    pub variance_epsilon: f64,

    /// An axis dominates when its variance is at least this multiple of the other.
    pub dominance_ratio: f64,

    /// Backwards steps smaller than this (fraction of frame) still count as monotonic.
    pub monotonic_tolerance: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            variance_epsilon: 0.002,
            dominance_ratio: 4.0,
            monotonic_tolerance: 0.01,
        }
    }
}

/// Classification result with the statistics it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementAnalysis {
    /// Sample variance of the normalized center x.
    pub variance_x: f64,
    /// Sample variance of the normalized center y.
    pub variance_y: f64,
    pub movement: Movement,
}

/// Labels tracks as static, moving, or complex.
#[derive(Debug, Clone, Default)]
pub struct MovementClassifier {
    config: MovementConfig,
}

impl MovementClassifier {
    pub fn new(config: MovementConfig) -> Self {
        Self { config }
    }

    /// Classify a track. Single-detection tracks are always static.
    pub fn classify(&self, track: &Track, frame: FrameDimensions) -> MovementAnalysis {
        let width = f64::from(frame.width.max(1));
        let height = f64::from(frame.height.max(1));
        let xs: Vec<f64> = track
            .detections
            .iter()
            .map(|d| d.bbox.center().0 / width)
            .collect();
        let ys: Vec<f64> = track
            .detections
            .iter()
            .map(|d| d.bbox.center().1 / height)
            .collect();

        let variance_x = sample_variance(&xs);
        let variance_y = sample_variance(&ys);
        let movement = if xs.len() < 2 {
            Movement::Static
        } else {
            self.label(variance_x, variance_y, &xs, &ys)
        };

        tracing::debug!(
            track_id = track.id,
            variance_x,
            variance_y,
            ?movement,
            "Classified track movement"
        );

        MovementAnalysis {
            variance_x,
            variance_y,
            movement,
        }
    }

    fn label(&self, variance_x: f64, variance_y: f64, xs: &[f64], ys: &[f64]) -> Movement {
        let eps = self.config.variance_epsilon;
        let moving_x = variance_x >= eps;
        let moving_y = variance_y >= eps;

        let axis = match (moving_x, moving_y) {
            (false, false) => return Movement::Static,
            (true, false) => MotionAxis::Horizontal,
            (false, true) => MotionAxis::Vertical,
            (true, true) => {
                let ratio = self.config.dominance_ratio;
                if variance_x >= ratio * variance_y {
                    MotionAxis::Horizontal
                } else if variance_y >= ratio * variance_x {
                    MotionAxis::Vertical
                } else {
                    return Movement::Complex;
                }
            }
        };

        let positions = match axis {
            MotionAxis::Horizontal => xs,
            MotionAxis::Vertical => ys,
        };
        if is_monotonic(positions, self.config.monotonic_tolerance) {
            Movement::Moving { axis }
        } else {
            Movement::Complex
        }
    }
}

/// Unbiased sample variance; zero for fewer than two values.
fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

fn is_monotonic(values: &[f64], tolerance: f64) -> bool {
    let non_decreasing = values.windows(2).all(|w| w[1] - w[0] >= -tolerance);
    let non_increasing = values.windows(2).all(|w| w[1] - w[0] <= tolerance);
    non_decreasing || non_increasing
}
