//! Clearmark Timeline Model
//!
//! Defines the data contracts shared by the analysis core and the engine adapters:
//! - **Detections:** Timestamped text/logo observations in pixel space
//! - **Tracks:** Detections grouped into one persistent watermark
//! - **Regions:** Frame-safe rectangles accepted by the media-transform engine
//! - **Plans:** Time-gated removal segments plus a fallback region
//!
//! All boxes are in the pixel space of the source video frame.

pub mod detection;
pub mod plan;
pub mod region;
pub mod track;

pub use detection::*;
pub use plan::*;
pub use region::*;
pub use track::*;
