//! Backup Rotator Library
//!
//! Configuration, the HTTP control-plane gateway and the scheduled daemon
//! around the `rotation-core` engine.

pub mod config;
pub mod daemon;
pub mod provider;
pub mod utils;

// Re-export commonly used types
pub use config::RotatorConfig;
pub use provider::HttpProvider;
pub use utils::errors::RotatorError;
pub type Result<T> = std::result::Result<T, RotatorError>;
