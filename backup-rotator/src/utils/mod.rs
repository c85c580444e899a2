//! Utility modules for the rotator binary.

pub mod errors;
pub mod logger;

pub use errors::{Result, RotatorError};
