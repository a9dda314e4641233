//! Error types shared across Clearmark crates.

/// Top-level error type for Clearmark operations.
#[derive(Debug, thiserror::Error)]
pub enum ClearmarkError {
    /// Bad duration, sample count, or other caller-supplied value.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The frame is too small to hold a minimum 2x2 region with a 1px margin.
    #[error("Degenerate frame {width}x{height}: no region can satisfy the minimum size")]
    DegenerateFrame { width: u32, height: u32 },

    /// The media-transform engine refused a synthesized plan.
    #[error("Plan rejected for track {track_id}: {message}")]
    PlanRejected { track_id: u32, message: String },

    /// A single detector call failed.
    #[error("Detection error: {message}")]
    Detection { message: String },

    /// A track classification field was set twice or a lifecycle step was skipped.
    #[error("Track error: {message}")]
    Track { message: String },

    /// The removal backend is unavailable or could not be launched.
    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClearmarkError.
pub type ClearmarkResult<T> = Result<T, ClearmarkError>;

impl ClearmarkError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn degenerate_frame(width: u32, height: u32) -> Self {
        Self::DegenerateFrame { width, height }
    }

    pub fn plan_rejected(track_id: u32, msg: impl Into<String>) -> Self {
        Self::PlanRejected {
            track_id,
            message: msg.into(),
        }
    }

    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection {
            message: msg.into(),
        }
    }

    pub fn track(msg: impl Into<String>) -> Self {
        Self::Track {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error should be swallowed at sample granularity.
    pub fn is_per_sample(&self) -> bool {
        matches!(self, Self::Detection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_frame_message() {
        let err = ClearmarkError::degenerate_frame(2, 480);
        assert_eq!(
            err.to_string(),
            "Degenerate frame 2x480: no region can satisfy the minimum size"
        );
    }

    #[test]
    fn test_per_sample_classification() {
        assert!(ClearmarkError::detection("ocr timeout").is_per_sample());
        assert!(!ClearmarkError::plan_rejected(3, "bad graph").is_per_sample());
        assert!(!ClearmarkError::Cancelled.is_per_sample());
    }
}
