//! Output directory and sink provisioning
//!
//! Resolves where a session writes its artifact and opens the file. When no
//! directory is configured a fresh `profile*` directory is created under the
//! system temp dir and kept after the session ends.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::SessionConfig;
use crate::domain::ProfileError;

/// Return the configured output directory, creating it recursively, or
/// allocate a new uniquely named temporary directory.
///
/// # Errors
/// Returns [`ProfileError::CreateOutputDir`] if the directory cannot be created
pub fn resolve_output_dir(config: &SessionConfig) -> Result<PathBuf, ProfileError> {
    match &config.output_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| ProfileError::CreateOutputDir {
                path: dir.clone(),
                source,
            })?;
            Ok(dir.clone())
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix("profile")
                .keep(true)
                .tempdir()
                .map_err(|source| ProfileError::CreateOutputDir {
                    path: std::env::temp_dir(),
                    source,
                })?;
            Ok(dir.path().to_path_buf())
        }
    }
}

/// The configured filename, or `default_name` when unset.
pub fn resolve_filename<'a>(config: &'a SessionConfig, default_name: &'a str) -> &'a str {
    config.output_filename.as_deref().unwrap_or(default_name)
}

/// Writable, closable destination for captured profile data.
#[derive(Debug)]
pub struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Sink {
    /// Create (truncating) `dir/filename`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    pub fn create(dir: &Path, filename: &str) -> io::Result<Self> {
        let path = dir.join(filename);
        let file = File::create(&path)?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered data and close the underlying file.
    ///
    /// # Errors
    /// Returns an error if flushing or syncing fails
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileOption;

    #[test]
    fn test_configured_dir_created_recursively() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("a").join("b");
        let config = SessionConfig::resolve([ProfileOption::ProfilePath(nested.clone())]).unwrap();

        assert_eq!(resolve_output_dir(&config).unwrap(), nested);
        assert!(nested.is_dir());
        // Idempotent when the directory already exists
        assert_eq!(resolve_output_dir(&config).unwrap(), nested);
    }

    #[test]
    fn test_temp_dirs_are_fresh() {
        let config = SessionConfig::default();
        let first = resolve_output_dir(&config).unwrap();
        let second = resolve_output_dir(&config).unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
        let _ = fs::remove_dir(first);
        let _ = fs::remove_dir(second);
    }

    #[test]
    fn test_dir_creation_failure() {
        let base = tempfile::tempdir().unwrap();
        let blocker = base.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let config =
            SessionConfig::resolve([ProfileOption::ProfilePath(blocker.join("sub"))]).unwrap();

        let err = resolve_output_dir(&config).unwrap_err();
        assert!(matches!(err, ProfileError::CreateOutputDir { .. }));
    }

    #[test]
    fn test_resolve_filename() {
        let config = SessionConfig::default();
        assert_eq!(resolve_filename(&config, "cpu.pprof"), "cpu.pprof");

        let config =
            SessionConfig::resolve([ProfileOption::ProfileFilename("x.out".into())]).unwrap();
        assert_eq!(resolve_filename(&config, "cpu.pprof"), "x.out");
    }

    #[test]
    fn test_sink_truncates_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p.out"), b"old contents").unwrap();

        let mut sink = Sink::create(dir.path(), "p.out").unwrap();
        assert_eq!(sink.path(), dir.path().join("p.out"));
        sink.write_all(b"new").unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read(dir.path().join("p.out")).unwrap(), b"new");
    }
}
