//! Removal plans and the per-track processing lifecycle.

use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};

use crate::detection::FrameDimensions;
use crate::region::Region;
use crate::track::RemovalMethod;

/// A region removed with `method` while `start_secs <= t <= end_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemovalSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub region: Region,
    pub method: RemovalMethod,
}

impl RemovalSegment {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Whether `self` and `next` share a boundary and do not overlap.
    pub fn abuts(&self, next: &RemovalSegment) -> bool {
        (self.end_secs - next.start_secs).abs() < 1e-9
    }
}

/// Which shape the planner settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanShape {
    /// One region over the whole track span.
    Static,
    /// Several time-gated regions following the watermark.
    Segmented,
    /// The union region, substituted for a segmented plan or forced on retry.
    Fallback,
}

/// The removal instructions for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalPlan {
    pub track_id: u32,
    pub shape: PlanShape,

    /// Time-ordered, non-overlapping instructions. Never empty.
    pub segments: Vec<RemovalSegment>,

    /// Union region over the full track span, used if `segments` is rejected.
    pub fallback: Option<RemovalSegment>,
}

impl RemovalPlan {
    /// Time window covered by the plan.
    pub fn span(&self) -> Option<(f64, f64)> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some((first.start_secs, last.end_secs))
    }

    /// Check every geometric and temporal invariant against `frame`.
    pub fn check(&self, frame: FrameDimensions) -> ClearmarkResult<()> {
        if self.segments.is_empty() {
            return Err(ClearmarkError::track(format!(
                "plan for track {} has no segments",
                self.track_id
            )));
        }

        for segment in self.segments.iter().chain(self.fallback.iter()) {
            let duration = segment.duration_secs();
            if duration.is_nan() || duration <= 0.0 {
                return Err(ClearmarkError::track(format!(
                    "track {} has an empty window [{}, {}]",
                    self.track_id, segment.start_secs, segment.end_secs
                )));
            }
            if !segment.region.fits_within(frame) {
                return Err(ClearmarkError::track(format!(
                    "track {} region {:?} violates the {}x{} frame margin",
                    self.track_id, segment.region, frame.width, frame.height
                )));
            }
        }

        for pair in self.segments.windows(2) {
            if pair[1].start_secs < pair[0].end_secs - 1e-9 {
                return Err(ClearmarkError::track(format!(
                    "track {} has overlapping segments",
                    self.track_id
                )));
            }
        }

        Ok(())
    }
}

/// Processing state of a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Collected,
    Classified,
    Validated,
    Planned,
    Synthesized,
    Executed,
    Abandoned,
}

impl TrackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrackState::Executed | TrackState::Abandoned)
    }

    fn allows(self, next: TrackState) -> bool {
        use TrackState::*;
        matches!(
            (self, next),
            (Collected, Classified)
                | (Classified, Validated)
                | (Validated, Planned)
                | (Planned, Synthesized)
                | (Synthesized, Executed)
                | (Synthesized, Abandoned)
                // a rejected plan re-enters planning once with a forced fallback
                | (Synthesized, Planned)
        )
    }
}

/// State machine guarding the order of per-track processing steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackLifecycle {
    pub track_id: u32,
    state: TrackState,
    retries: u32,
}

impl TrackLifecycle {
    /// At most one fallback retry per track.
    pub const MAX_RETRIES: u32 = 1;

    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            state: TrackState::Collected,
            retries: 0,
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn can_retry(&self) -> bool {
        self.state == TrackState::Synthesized && self.retries < Self::MAX_RETRIES
    }

    /// Move to `next`, rejecting skipped or backwards steps.
    pub fn advance(&mut self, next: TrackState) -> ClearmarkResult<()> {
        if !self.state.allows(next) {
            return Err(ClearmarkError::track(format!(
                "track {} cannot move from {:?} to {:?}",
                self.track_id, self.state, next
            )));
        }
        if self.state == TrackState::Synthesized && next == TrackState::Planned {
            if self.retries >= Self::MAX_RETRIES {
                return Err(ClearmarkError::track(format!(
                    "track {} already used its fallback retry",
                    self.track_id
                )));
            }
            self.retries += 1;
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64) -> RemovalSegment {
        RemovalSegment {
            start_secs: start,
            end_secs: end,
            region: Region::new(10, 10, 20, 20),
            method: RemovalMethod::Delogo,
        }
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut lifecycle = TrackLifecycle::new(7);
        for state in [
            TrackState::Classified,
            TrackState::Validated,
            TrackState::Planned,
            TrackState::Synthesized,
            TrackState::Executed,
        ] {
            lifecycle.advance(state).unwrap();
        }
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn test_lifecycle_rejects_skipped_step() {
        let mut lifecycle = TrackLifecycle::new(1);
        assert!(lifecycle.advance(TrackState::Planned).is_err());
        assert_eq!(lifecycle.state(), TrackState::Collected);
    }

    #[test]
    fn test_lifecycle_allows_one_retry() {
        let mut lifecycle = TrackLifecycle::new(1);
        for state in [
            TrackState::Classified,
            TrackState::Validated,
            TrackState::Planned,
            TrackState::Synthesized,
        ] {
            lifecycle.advance(state).unwrap();
        }
        assert!(lifecycle.can_retry());
        lifecycle.advance(TrackState::Planned).unwrap();
        lifecycle.advance(TrackState::Synthesized).unwrap();
        assert!(!lifecycle.can_retry());
        assert!(lifecycle.advance(TrackState::Planned).is_err());
        lifecycle.advance(TrackState::Abandoned).unwrap();
        assert_eq!(lifecycle.retries(), 1);
    }

    #[test]
    fn test_plan_check_detects_overlap_and_margin() {
        let frame = FrameDimensions::new(640, 480);
        let mut plan = RemovalPlan {
            track_id: 0,
            shape: PlanShape::Segmented,
            segments: vec![segment(0.0, 2.0), segment(2.0, 4.0)],
            fallback: None,
        };
        assert!(plan.check(frame).is_ok());
        assert!(plan.segments[0].abuts(&plan.segments[1]));

        plan.segments[1].start_secs = 1.5;
        assert!(plan.check(frame).is_err());

        plan.segments[1].start_secs = 2.0;
        plan.segments[1].region = Region::new(630, 10, 10, 10);
        assert!(plan.check(frame).is_err());
    }

    #[test]
    fn test_empty_plan_fails_check() {
        let plan = RemovalPlan {
            track_id: 0,
            shape: PlanShape::Static,
            segments: vec![],
            fallback: None,
        };
        assert!(plan.check(FrameDimensions::new(640, 480)).is_err());
        assert_eq!(plan.span(), None);
    }
}
