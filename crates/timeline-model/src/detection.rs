//! Detection types produced by sampling a video.
//!
//! Recorded detections are stored as JSONL, one observation per line:
//!
//! ```text
//! {"t":2.0,"x":520,"y":12,"w":96,"h":24,"text":"www.example.tv","confidence":0.91}
//! ```

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a video frame, constant for one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether a minimum 2x2 region with a 1px edge margin fits this frame.
    pub fn can_hold_region(&self) -> bool {
        self.width >= 3 && self.height >= 3
    }
}

/// An unvalidated box in pixel space, as reported by a detector.
///
/// Values may be negative or run past the frame edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl BoundingBox {
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i64 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(self.h)
    }

    /// Center point in pixels.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 / 2.0,
            self.y as f64 + self.h as f64 / 2.0,
        )
    }

    /// Area in square pixels; zero for inverted or empty boxes.
    pub fn area(&self) -> i64 {
        self.w.max(0).saturating_mul(self.h.max(0))
    }

    /// Whether the detector reported a box with no usable extent.
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Intersection-over-union with another box, in `[0.0, 1.0]`.
    ///
    /// Computed in floating point so detector boxes with extreme coordinates
    /// cannot overflow.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix = overlap(self.x, self.right(), other.x, other.right());
        let iy = overlap(self.y, self.bottom(), other.y, other.bottom());
        let intersection = ix * iy;
        let area = |b: &BoundingBox| b.w.max(0) as f64 * b.h.max(0) as f64;
        let union = area(self) + area(other) - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        (intersection / union).clamp(0.0, 1.0)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            w: self.right().max(other.right()).saturating_sub(x),
            h: self.bottom().max(other.bottom()).saturating_sub(y),
        }
    }

    /// Grow the box by `padding` pixels on every side.
    pub fn padded(&self, padding: i64) -> BoundingBox {
        let grow = padding.saturating_mul(2);
        BoundingBox {
            x: self.x.saturating_sub(padding),
            y: self.y.saturating_sub(padding),
            w: self.w.saturating_add(grow),
            h: self.h.saturating_add(grow),
        }
    }
}

/// Length of the overlap of `[a0, a1)` and `[b0, b1)`, zero if disjoint.
fn overlap(a0: i64, a1: i64, b0: i64, b1: i64) -> f64 {
    let len = i128::from(a1.min(b1)) - i128::from(a0.max(b0));
    len.max(0) as f64
}

/// One record returned by the external text detector for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(flatten)]
    pub bbox: BoundingBox,

    /// Recognized text; empty for logo-only detections.
    #[serde(default)]
    pub text: String,

    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// A single observation of a candidate watermark at one sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Sample timestamp in seconds since video start.
    #[serde(rename = "t")]
    pub time_secs: f64,

    #[serde(flatten)]
    pub bbox: BoundingBox,

    #[serde(default)]
    pub text: String,

    pub confidence: f64,

    /// Set from text patterns when the detection was annotated.
    #[serde(default)]
    pub watermark_like: bool,
}

impl Detection {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A detector record tagged with the sample time it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDetection {
    #[serde(rename = "t")]
    pub time_secs: f64,

    #[serde(flatten)]
    pub raw: RawDetection,
}

/// Parse recorded detections from JSONL content (one JSON object per line).
pub fn parse_recorded_detections(jsonl: &str) -> Result<Vec<RecordedDetection>, serde_json::Error> {
    jsonl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(10, 10, 100, 50);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);

        let b = BoundingBox::new(500, 300, 20, 20);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_and_padding() {
        let a = BoundingBox::new(10, 20, 30, 40);
        let b = BoundingBox::new(50, 5, 10, 10);
        assert_eq!(a.union(&b), BoundingBox::new(10, 5, 50, 55));
        assert_eq!(a.padded(10), BoundingBox::new(0, 10, 50, 60));
    }

    #[test]
    fn test_extreme_coordinates_saturate() {
        let far = BoundingBox::new(i64::MAX - 10, 0, 100, 20);
        let also_far = BoundingBox::new(i64::MAX - 5, 0, 100, 20);
        assert_eq!(far.right(), i64::MAX);
        assert!((0.0..=1.0).contains(&far.iou(&also_far)));
        assert_eq!(far.union(&also_far).right(), i64::MAX);

        let huge = BoundingBox::new(i64::MIN, i64::MIN, i64::MAX, i64::MAX);
        assert_eq!(huge.area(), i64::MAX);
        assert_eq!(huge.padded(10).x, i64::MIN);
        assert_eq!(huge.padded(10).w, i64::MAX);
        assert_eq!(huge.iou(&BoundingBox::new(0, 0, 10, 10)), 0.0);
    }

    #[test]
    fn test_degenerate_box() {
        assert!(BoundingBox::new(0, 0, 0, 10).is_degenerate());
        assert!(BoundingBox::new(0, 0, 5, -1).is_degenerate());
        assert_eq!(BoundingBox::new(0, 0, -5, 10).area(), 0);
    }

    #[test]
    fn test_parse_recorded_detections() {
        let jsonl = "# sample\n\
            {\"t\":0.0,\"x\":448,\"y\":336,\"w\":192,\"h\":144,\"text\":\"logo.tv\",\"confidence\":0.9}\n\
            \n\
            {\"t\":2.0,\"x\":10,\"y\":10,\"w\":40,\"h\":40,\"confidence\":0.7}\n";
        let records = parse_recorded_detections(jsonl).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw.bbox, BoundingBox::new(448, 336, 192, 144));
        assert_eq!(records[0].raw.text, "logo.tv");
        assert!(records[1].raw.text.is_empty());
        assert!((records[1].time_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_can_hold_region() {
        assert!(FrameDimensions::new(3, 3).can_hold_region());
        assert!(!FrameDimensions::new(2, 480).can_hold_region());
    }
}
