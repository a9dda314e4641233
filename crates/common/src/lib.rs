//! Clearmark Common Utilities
//!
//! Shared infrastructure for all Clearmark crates:
//! - Error taxonomy and result aliases
//! - Run clock for timing removal sessions
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
