//! Structured error types for profile-session
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Start() already called")]
    AlreadyStarted,

    #[error("filename must not contain path elements: {0:?}")]
    InvalidFilename(String),

    #[error("could not create initial output directory {path:?}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not create {what} {path:?}: {source}")]
    CreateProfile {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not start cpu profile: {0}")]
    CpuStart(String),

    #[error("could not start trace: {0}")]
    TraceStart(String),

    #[error("could not install shutdown hook: {0}")]
    ShutdownHook(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_started_display() {
        assert_eq!(ProfileError::AlreadyStarted.to_string(), "Start() already called");
    }

    #[test]
    fn test_create_profile_error_names_path() {
        let err = ProfileError::CreateProfile {
            what: "cpu profile",
            path: PathBuf::from("/nonexistent/cpu.pprof"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = err.to_string();
        assert!(msg.contains("cpu profile"));
        assert!(msg.contains("/nonexistent/cpu.pprof"));
    }
}
