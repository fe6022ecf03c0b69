//! # Validation
//!
//! Input validation shared by the custom resource kinds.

mod duration;

pub use duration::{parse_duration, parse_duration_secs};
