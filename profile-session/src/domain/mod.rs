//! Domain model for profile-session
//!
//! This module contains core domain types and errors that provide:
//! - The closed set of profiling modes and their output naming
//! - Structured error handling for session setup

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{MemoryKind, Mode, DEFAULT_MEM_PROFILE_RATE};

pub use errors::ProfileError;
