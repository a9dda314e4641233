//! Frame-safe removal regions.

use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, FrameDimensions};

/// Smallest width or height the media-transform filters accept.
pub const MIN_REGION_SIZE: u32 = 2;

/// A rectangle that lies strictly inside the frame.
///
/// Regions are produced by the coordinate validator and satisfy
/// `x + w <= width - 1`, `y + h <= height - 1`, and `w, h >= 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    /// Whether this region keeps the 1px margin and minimum size for `frame`.
    pub fn fits_within(&self, frame: FrameDimensions) -> bool {
        self.w >= MIN_REGION_SIZE
            && self.h >= MIN_REGION_SIZE
            && u64::from(self.x) + u64::from(self.w) < u64::from(frame.width)
            && u64::from(self.y) + u64::from(self.h) < u64::from(frame.height)
    }

    /// Smallest region containing both regions.
    ///
    /// The union of two frame-safe regions is frame-safe for the same frame.
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            x,
            y,
            w: self.right().max(other.right()) - x,
            h: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Whether every edge is within `tol_x`/`tol_y` pixels of `other`.
    pub fn within_tolerance(&self, other: &Region, tol_x: f64, tol_y: f64) -> bool {
        let dx = |a: u32, b: u32| (f64::from(a) - f64::from(b)).abs();
        dx(self.x, other.x) < tol_x
            && dx(self.w, other.w) < tol_x
            && dx(self.y, other.y) < tol_y
            && dx(self.h, other.h) < tol_y
    }

    pub fn as_bbox(&self) -> BoundingBox {
        BoundingBox::new(
            i64::from(self.x),
            i64::from(self.y),
            i64::from(self.w),
            i64::from(self.h),
        )
    }
}
