//! Error handling types for promptic.
//!
//! This module is intentionally dependency-light and shared across the crate.

mod conversions;
pub mod types;

pub use types::*;
