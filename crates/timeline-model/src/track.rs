//! Tracks: detections believed to be the same physical watermark.

use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};

use crate::detection::{BoundingBox, Detection};

/// Axis along which a moving watermark travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionAxis {
    Horizontal,
    Vertical,
}

/// Motion pattern of a track across the sampled frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Movement {
    /// Position stays within the variance threshold.
    Static,
    /// Position changes predominantly and monotonically along one axis.
    Moving { axis: MotionAxis },
    /// Position changes along both axes or doubles back.
    Complex,
}

impl Movement {
    pub fn is_static(&self) -> bool {
        matches!(self, Movement::Static)
    }
}

/// How a region is removed by the media-transform engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMethod {
    /// Interpolate the region from its border (URL and legal-notice text).
    Delogo,
    /// Blur the region (logo-only detections).
    Blur,
    /// Soft fill for general overlaid text.
    Inpaint,
    /// Opaque fill; the last resort.
    Blackout,
}

impl RemovalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalMethod::Delogo => "delogo",
            RemovalMethod::Blur => "blur",
            RemovalMethod::Inpaint => "inpaint",
            RemovalMethod::Blackout => "blackout",
        }
    }
}

/// A time-ordered group of detections of one watermark instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u32,

    /// Detections in strictly increasing time order.
    pub detections: Vec<Detection>,

    /// Most frequent text among the detections; empty for logo-only tracks.
    pub representative_text: String,

    movement: Option<Movement>,
    method: Option<RemovalMethod>,
}

impl Track {
    /// Build a track from time-ordered detections.
    pub fn new(id: u32, detections: Vec<Detection>) -> Self {
        let representative_text = representative_text(&detections);
        Self {
            id,
            detections,
            representative_text,
            movement: None,
            method: None,
        }
    }

    pub fn movement(&self) -> Option<Movement> {
        self.movement
    }

    pub fn method(&self) -> Option<RemovalMethod> {
        self.method
    }

    /// Record the movement classification. May only be set once.
    pub fn set_movement(&mut self, movement: Movement) -> ClearmarkResult<()> {
        if self.movement.is_some() {
            return Err(ClearmarkError::track(format!(
                "track {} already has a movement classification",
                self.id
            )));
        }
        self.movement = Some(movement);
        Ok(())
    }

    /// Record the removal method. May only be set once.
    pub fn set_method(&mut self, method: RemovalMethod) -> ClearmarkResult<()> {
        if self.method.is_some() {
            return Err(ClearmarkError::track(format!(
                "track {} already has a removal method",
                self.id
            )));
        }
        self.method = Some(method);
        Ok(())
    }

    pub fn first_time(&self) -> Option<f64> {
        self.detections.first().map(|d| d.time_secs)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.detections.last().map(|d| d.time_secs)
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Bounding box of every detection in the track.
    pub fn extent(&self) -> Option<BoundingBox> {
        let mut boxes = self.detections.iter().map(|d| d.bbox);
        let first = boxes.next()?;
        Some(boxes.fold(first, |acc, b| acc.union(&b)))
    }

    pub fn is_watermark_like(&self) -> bool {
        self.detections.iter().any(|d| d.watermark_like)
    }

    pub fn max_confidence(&self) -> f64 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f64, f64::max)
    }
}

/// Most frequent non-empty text; ties go to the longer, then the earlier text.
fn representative_text(detections: &[Detection]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for detection in detections {
        let text = detection.text.trim();
        if text.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(t, _)| *t == text) {
            Some((_, count)) => *count += 1,
            None => counts.push((text, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (text, count) in counts {
        let better = match best {
            None => true,
            Some((best_text, best_count)) => {
                count > best_count || (count == best_count && text.len() > best_text.len())
            }
        };
        if better {
            best = Some((text, count));
        }
    }

    best.map(|(text, _)| text.to_string()).unwrap_or_default()
}
