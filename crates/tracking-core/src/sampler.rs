//! Frame sampling: which timestamps the text detector should look at.
//!
//! Samples are evenly spaced over `[0, duration)`. The spacing is also the
//! sampling interval used downstream to bound track gaps and to decide
//! whether a track reaches the end of the video.

use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};

/// Configuration for deriving a sample count from the video duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Desired spacing between samples in seconds.
    pub target_interval_secs: f64,

    /// Lower bound on the derived sample count.
    pub min_samples: usize,

    /// Upper bound on the derived sample count.
    pub max_samples: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_interval_secs: 2.0,
            min_samples: 3,
            max_samples: 120,
        }
    }
}

/// The timestamps chosen for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePlan {
    /// Strictly increasing, all in `[0, duration_secs)`.
    pub timestamps: Vec<f64>,

    /// Spacing between consecutive samples.
    pub interval_secs: f64,

    pub duration_secs: f64,
}

impl SamplePlan {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_sample(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
}

/// Chooses sample timestamps for a video.
#[derive(Debug, Clone, Default)]
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample count derived from the target interval, within the configured bounds.
    pub fn sample_count_for(&self, duration_secs: f64) -> ClearmarkResult<usize> {
        check_duration(duration_secs)?;
        let interval = self.config.target_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ClearmarkError::invalid_input(format!(
                "sampling interval must be positive, got {}",
                self.config.target_interval_secs
            )));
        }

        let min = self.config.min_samples.max(1);
        let max = self.config.max_samples.max(min);
        let wanted = (duration_secs / self.config.target_interval_secs).ceil() as usize;
        Ok(wanted.clamp(min, max))
    }

    /// Plan samples using the count derived from the target interval.
    pub fn plan(&self, duration_secs: f64) -> ClearmarkResult<SamplePlan> {
        let count = self.sample_count_for(duration_secs)?;
        self.plan_with_count(duration_secs, count)
    }

    /// Plan exactly `sample_count` samples.
    pub fn plan_with_count(
        &self,
        duration_secs: f64,
        sample_count: usize,
    ) -> ClearmarkResult<SamplePlan> {
        let timestamps = sample_timestamps(duration_secs, sample_count)?;
        let interval_secs = duration_secs / sample_count as f64;

        tracing::debug!(
            duration_secs,
            samples = timestamps.len(),
            interval_secs,
            "Planned frame samples"
        );

        Ok(SamplePlan {
            timestamps,
            interval_secs,
            duration_secs,
        })
    }
}

/// `sample_count` evenly spaced timestamps spanning `[0, duration_secs)`.
///
/// Deterministic for identical inputs. The last sample is strictly less
/// than `duration_secs`.
pub fn sample_timestamps(duration_secs: f64, sample_count: usize) -> ClearmarkResult<Vec<f64>> {
    check_duration(duration_secs)?;
    if sample_count == 0 {
        return Err(ClearmarkError::invalid_input("sample count must be at least 1"));
    }

    let n = sample_count as f64;
    let mut timestamps = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let mut t = duration_secs * (i as f64 / n);
        if t >= duration_secs {
            // largest float below a positive finite duration
            t = f64::from_bits(duration_secs.to_bits() - 1);
        }
        if let Some(&prev) = timestamps.last() {
            if t <= prev {
                return Err(ClearmarkError::invalid_input(format!(
                    "{sample_count} samples cannot be strictly increasing within {duration_secs}s"
                )));
            }
        }
        timestamps.push(t);
    }

    Ok(timestamps)
}

fn check_duration(duration_secs: f64) -> ClearmarkResult<()> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(ClearmarkError::invalid_input(format!(
            "video duration must be positive, got {duration_secs}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_spacing() {
        let ts = sample_timestamps(10.0, 5).unwrap();
        assert_eq!(ts, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_single_sample_starts_at_zero() {
        assert_eq!(sample_timestamps(3.5, 1).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            sample_timestamps(0.0, 3),
            Err(ClearmarkError::InvalidInput { .. })
        ));
        assert!(sample_timestamps(-1.0, 3).is_err());
        assert!(sample_timestamps(f64::NAN, 3).is_err());
        assert!(sample_timestamps(10.0, 0).is_err());
    }

    #[test]
    fn test_deterministic_and_bounded() {
        let a = sample_timestamps(37.3, 17).unwrap();
        let b = sample_timestamps(37.3, 17).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 17);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(*a.last().unwrap() < 37.3);
    }

    #[test]
    fn test_sample_count_from_interval() {
        let sampler = FrameSampler::default();
        assert_eq!(sampler.sample_count_for(60.0).unwrap(), 30);
        // short videos still get the minimum
        assert_eq!(sampler.sample_count_for(1.0).unwrap(), 3);
        // long videos are capped
        assert_eq!(sampler.sample_count_for(3600.0).unwrap(), 120);
    }

    #[test]
    fn test_plan_reports_interval() {
        let plan = FrameSampler::default().plan_with_count(10.0, 4).unwrap();
        assert!((plan.interval_secs - 2.5).abs() < 1e-9);
        assert_eq!(plan.last_sample(), Some(7.5));
        assert_eq!(plan.len(), 4);
    }
}
