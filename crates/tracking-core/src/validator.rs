//! Coordinate validation: clamp boxes strictly inside the frame.
//!
//! The media-transform engine rejects regions that touch or cross the frame
//! edge, and its filters need at least 2x2 pixels. Every box passes through
//! [`validate`] before it becomes part of a track's representative region or
//! a removal segment.

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::{BoundingBox, FrameDimensions};
use clearmark_timeline_model::region::{Region, MIN_REGION_SIZE};

/// Clamp `bbox` into `frame`, keeping a 1px margin and a 2px minimum size.
///
/// Steps, in order:
/// 1. clamp `x` into `[0, width - 1]` and `y` into `[0, height - 1]`;
/// 2. clamp `w` to `width - x - 1` and `h` to `height - y - 1`;
/// 3. raise `w`/`h` to 2, moving the origin toward the interior if needed.
///
/// Idempotent. Fails only when the frame is smaller than 3x3.
pub fn validate(bbox: &BoundingBox, frame: FrameDimensions) -> ClearmarkResult<Region> {
    if !frame.can_hold_region() {
        return Err(ClearmarkError::degenerate_frame(frame.width, frame.height));
    }

    let (x, w) = clamp_axis(bbox.x, bbox.w, i64::from(frame.width));
    let (y, h) = clamp_axis(bbox.y, bbox.h, i64::from(frame.height));

    Ok(Region::new(x as u32, y as u32, w as u32, h as u32))
}

/// Validate every box, failing on the first degenerate frame error.
pub fn validate_all(boxes: &[BoundingBox], frame: FrameDimensions) -> ClearmarkResult<Vec<Region>> {
    boxes.iter().map(|b| validate(b, frame)).collect()
}

/// Clamp one axis of a box against a frame extent of `size` (>= 3).
fn clamp_axis(origin: i64, length: i64, size: i64) -> (i64, i64) {
    let min = i64::from(MIN_REGION_SIZE);
    let mut origin = origin.clamp(0, size - 1);
    let mut length = length.min(size - origin - 1);
    if length < min {
        length = min;
        if origin + length > size - 1 {
            origin = size - 1 - length;
        }
    }
    (origin, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FRAME: FrameDimensions = FrameDimensions {
        width: 640,
        height: 480,
    };

    #[test]
    fn test_edge_touching_box_loses_one_pixel() {
        let region = validate(&BoundingBox::new(448, 336, 192, 144), FRAME).unwrap();
        assert_eq!(region, Region::new(448, 336, 191, 143));
    }

    #[test]
    fn test_interior_box_unchanged() {
        let region = validate(&BoundingBox::new(10, 20, 100, 50), FRAME).unwrap();
        assert_eq!(region, Region::new(10, 20, 100, 50));
    }

    #[test]
    fn test_negative_origin_clamped() {
        let region = validate(&BoundingBox::new(-30, -5, 100, 50), FRAME).unwrap();
        assert_eq!(region, Region::new(0, 0, 100, 50));
    }

    #[test]
    fn test_origin_past_edge_moves_inward_for_floor() {
        let region = validate(&BoundingBox::new(900, 479, 40, 40), FRAME).unwrap();
        assert_eq!(region, Region::new(637, 477, 2, 2));
        assert!(region.fits_within(FRAME));
    }

    #[test]
    fn test_tiny_box_raised_to_floor() {
        let region = validate(&BoundingBox::new(100, 100, 0, -4), FRAME).unwrap();
        assert_eq!(region, Region::new(100, 100, 2, 2));
    }

    #[test]
    fn test_smallest_legal_frame() {
        let region = validate(&BoundingBox::new(5, 5, 10, 10), FrameDimensions::new(3, 3)).unwrap();
        assert_eq!(region, Region::new(0, 0, 2, 2));
    }

    #[test]
    fn test_degenerate_frame_fails() {
        let err = validate(&BoundingBox::new(0, 0, 1, 1), FrameDimensions::new(2, 100)).unwrap_err();
        assert!(matches!(
            err,
            ClearmarkError::DegenerateFrame {
                width: 2,
                height: 100
            }
        ));
    }

    proptest! {
        #[test]
        fn prop_validated_region_satisfies_invariants(
            x in -5_000i64..5_000,
            y in -5_000i64..5_000,
            w in -500i64..5_000,
            h in -500i64..5_000,
            fw in 3u32..4_000,
            fh in 3u32..4_000,
        ) {
            let frame = FrameDimensions::new(fw, fh);
            let region = validate(&BoundingBox::new(x, y, w, h), frame).unwrap();
            prop_assert!(region.w >= 2 && region.h >= 2);
            prop_assert!(region.x + region.w <= fw - 1);
            prop_assert!(region.y + region.h <= fh - 1);
            prop_assert!(region.fits_within(frame));
        }

        #[test]
        fn prop_validate_is_idempotent(
            x in -5_000i64..5_000,
            y in -5_000i64..5_000,
            w in -500i64..5_000,
            h in -500i64..5_000,
            fw in 3u32..4_000,
            fh in 3u32..4_000,
        ) {
            let frame = FrameDimensions::new(fw, fh);
            let once = validate(&BoundingBox::new(x, y, w, h), frame).unwrap();
            let twice = validate(&once.as_bbox(), frame).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
