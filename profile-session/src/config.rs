//! Session configuration
//!
//! Options are applied left to right over a default draft. Mode-selecting
//! options overwrite the previous mode, so the last one wins. Values that
//! only matter for one mode (memory rate and kind) stay stored when another
//! mode is selected afterwards; they are just not honoured.

use std::path::{Path, PathBuf};

use crate::domain::{MemoryKind, Mode, ProfileError, DEFAULT_MEM_PROFILE_RATE};

/// A single configuration mutation passed to `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOption {
    /// Suppress informational messages
    Quiet,
    /// Do not hook SIGINT; the caller is responsible for calling `stop`
    NoShutdownHook,
    CpuProfile,
    /// Memory profiling at [`DEFAULT_MEM_PROFILE_RATE`]
    MemProfile,
    /// Memory profiling at the given rate
    MemProfileRate(usize),
    /// Memory profiling, writing the in-use heap profile
    MemProfileHeap,
    /// Memory profiling, writing the cumulative allocation profile
    MemProfileAllocs,
    MutexProfile,
    BlockProfile,
    TraceProfile,
    ThreadCreationProfile,
    GoroutineProfile,
    /// Base directory for the output file (created if absent)
    ProfilePath(PathBuf),
    /// Output filename; must not contain path elements
    ProfileFilename(String),
}

impl ProfileOption {
    fn apply(&self, config: &mut SessionConfig) {
        match self {
            ProfileOption::Quiet => config.quiet = true,
            ProfileOption::NoShutdownHook => config.install_shutdown_hook = false,
            ProfileOption::CpuProfile => config.mode = Mode::Cpu,
            ProfileOption::MemProfile => {
                config.memory_sample_rate = DEFAULT_MEM_PROFILE_RATE;
                config.mode = Mode::Memory;
            }
            ProfileOption::MemProfileRate(rate) => {
                config.memory_sample_rate = *rate;
                config.mode = Mode::Memory;
            }
            ProfileOption::MemProfileHeap => {
                config.memory_kind = MemoryKind::Heap;
                config.mode = Mode::Memory;
            }
            ProfileOption::MemProfileAllocs => {
                config.memory_kind = MemoryKind::Allocs;
                config.mode = Mode::Memory;
            }
            ProfileOption::MutexProfile => config.mode = Mode::Mutex,
            ProfileOption::BlockProfile => config.mode = Mode::Block,
            ProfileOption::TraceProfile => config.mode = Mode::Trace,
            ProfileOption::ThreadCreationProfile => config.mode = Mode::ThreadCreate,
            ProfileOption::GoroutineProfile => config.mode = Mode::Goroutine,
            ProfileOption::ProfilePath(path) => {
                config.output_dir = (!path.as_os_str().is_empty()).then(|| path.clone());
            }
            ProfileOption::ProfileFilename(name) => {
                config.output_filename = (!name.is_empty()).then(|| name.clone());
            }
        }
    }
}

/// Fully resolved, immutable session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub quiet: bool,
    pub install_shutdown_hook: bool,
    pub mode: Mode,
    pub output_dir: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub memory_sample_rate: usize,
    pub memory_kind: MemoryKind,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            install_shutdown_hook: true,
            mode: Mode::Cpu,
            output_dir: None,
            output_filename: None,
            memory_sample_rate: DEFAULT_MEM_PROFILE_RATE,
            memory_kind: MemoryKind::Heap,
        }
    }
}

impl SessionConfig {
    /// Fold `options` over the defaults and validate the result.
    ///
    /// # Errors
    /// Returns [`ProfileError::InvalidFilename`] if the configured filename
    /// contains path elements.
    pub fn resolve<I>(options: I) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = ProfileOption>,
    {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if let Some(name) = &self.output_filename {
            if !is_bare_filename(name) {
                return Err(ProfileError::InvalidFilename(name.clone()));
            }
        }
        Ok(())
    }
}

/// True when `name` is exactly its own final path component.
fn is_bare_filename(name: &str) -> bool {
    Path::new(name).file_name().is_some_and(|base| base == name)
        && !name.contains(std::path::MAIN_SEPARATOR)
        && !name.contains('/')
}
