//! Shared types for the contamination sensing daemon
//!
//! This crate contains the value types exchanged between the acquisition layer and
//! the daemon, plus the pure classification functions that turn a reading into a
//! safety verdict.

pub mod data;
pub mod error;
pub mod verdict;

// Re-export commonly used types
pub use data::*;
pub use error::*;
pub use verdict::*;
