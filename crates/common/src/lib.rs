//! QCut Common Utilities
//!
//! Shared infrastructure for all QCut crates:
//! - Error types and result aliases
//! - Export clock: elapsed time, ETA estimation, progress throttling
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
