//! Session controller
//!
//! A [`Profiler`] owns the process-scoped state: the instrumentation engine
//! and the flag that admits one session at a time. [`Profiler::global`] is
//! the instance behind [`crate::start`]; tests build their own around a
//! fake engine.
//!
//! Start ordering: options are resolved and validated first, then the
//! active flag is claimed, then the sink is opened and the mode activated.
//! Any failure after the claim releases the flag, so a failed start never
//! blocks the next one.
//!
//! Each profiler arms at most one interrupt listener, the first time a
//! session asks for it. The listener acts on whichever session is current
//! and only if that session opted in to the hook.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{info, warn};

use crate::config::{ProfileOption, SessionConfig};
use crate::domain::{Mode, ProfileError};
use crate::engine::{Engine, RuntimeEngine};
use crate::output::{resolve_filename, resolve_output_dir, Sink};
use crate::shutdown;
use crate::strategy::{self, Closer};

struct ProfilerState {
    active: AtomicBool,
    engine: Box<dyn Engine>,
    /// Running session, cleared by its first stop
    current: Mutex<Option<Arc<Session>>>,
    hook_armed: Mutex<bool>,
}

/// Process-scoped profiling state. Cheap to clone.
#[derive(Clone)]
pub struct Profiler {
    state: Arc<ProfilerState>,
}

impl Profiler {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self {
            state: Arc::new(ProfilerState {
                active: AtomicBool::new(false),
                engine: Box::new(engine),
                current: Mutex::new(None),
                hook_armed: Mutex::new(false),
            }),
        }
    }

    /// The process-wide profiler backed by [`RuntimeEngine`].
    pub fn global() -> &'static Profiler {
        static GLOBAL: OnceLock<Profiler> = OnceLock::new();
        GLOBAL.get_or_init(|| Profiler::new(RuntimeEngine))
    }

    pub fn engine(&self) -> &dyn Engine {
        self.state.engine.as_ref()
    }

    /// Whether a session is currently running.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    /// Start a session, exiting the process on failure.
    ///
    /// Setup failures are configuration or environment errors the caller
    /// cannot recover from: the error is printed to stderr and the process
    /// exits with status 1. Use [`Profiler::try_start`] to handle them.
    pub fn start<I>(&self, options: I) -> Profile
    where
        I: IntoIterator<Item = ProfileOption>,
    {
        match self.try_start(options) {
            Ok(profile) => profile,
            Err(e) => fatal(&e),
        }
    }

    /// Start a session.
    ///
    /// # Errors
    /// - [`ProfileError::InvalidFilename`] before any state is touched
    /// - [`ProfileError::AlreadyStarted`] if a session is running
    /// - directory, file, engine or shutdown hook failures
    pub fn try_start<I>(&self, options: I) -> Result<Profile, ProfileError>
    where
        I: IntoIterator<Item = ProfileOption>,
    {
        let config = SessionConfig::resolve(options)?;
        self.claim()?;
        self.open_session(config).inspect_err(|_| self.release())
    }

    fn claim(&self) -> Result<(), ProfileError> {
        self.state
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ProfileError::AlreadyStarted)
    }

    fn release(&self) {
        self.state.active.store(false, Ordering::Release);
    }

    /// Arm the interrupt listener unless this profiler already has one.
    fn arm_shutdown_hook(&self) -> Result<(), ProfileError> {
        let mut armed = self.state.hook_armed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*armed {
            let state = Arc::downgrade(&self.state);
            shutdown::install(move || {
                state.upgrade().is_some_and(|state| Profiler { state }.stop_on_interrupt())
            })?;
            *armed = true;
        }
        Ok(())
    }

    /// Stop the current session if it asked for the shutdown hook. Returns
    /// once its profile is written, or `false` if there was nothing to stop.
    fn stop_on_interrupt(&self) -> bool {
        let current = self.state.current.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let Some(session) = current.filter(|s| s.config.install_shutdown_hook) else {
            return false;
        };
        info!("profile: caught interrupt, stopping profiles");
        Profile { session }.stop();
        true
    }

    fn set_current(&self, session: Option<Arc<Session>>) {
        *self.state.current.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn open_session(&self, config: SessionConfig) -> Result<Profile, ProfileError> {
        if config.install_shutdown_hook {
            self.arm_shutdown_hook()?;
        }

        let mode = config.mode;
        let dir = resolve_output_dir(&config)?;
        let filename = resolve_filename(&config, mode.default_filename());
        let sink = Sink::create(&dir, filename).map_err(|source| ProfileError::CreateProfile {
            what: mode.artifact(),
            path: dir.join(filename),
            source,
        })?;
        let path = sink.path().to_path_buf();

        let closer = strategy::activate(&config, sink, self.engine())?;
        if !config.quiet {
            match mode {
                Mode::Memory => info!(
                    "profile: {} enabled (rate {}), {}",
                    mode.label(),
                    self.engine().memory_sample_rate(),
                    path.display()
                ),
                _ => info!("profile: {} enabled, {}", mode.label(), path.display()),
            }
        }

        let session = Arc::new(Session {
            config,
            path,
            stopped: AtomicBool::new(false),
            closer: Mutex::new(Some(closer)),
            profiler: self.clone(),
        });
        self.set_current(Some(Arc::clone(&session)));
        Ok(Profile { session })
    }
}

struct Session {
    config: SessionConfig,
    path: PathBuf,
    stopped: AtomicBool,
    closer: Mutex<Option<Closer>>,
    profiler: Profiler,
}

impl Session {
    /// Run the closer if this is the first stop. Returns whether it ran.
    ///
    /// The closer runs under the lock, so a concurrent stop returns only
    /// after the profile is written.
    fn finish(&self) -> bool {
        let mut slot = self.closer.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(closer) = slot.take() {
            if let Err(e) = closer.close(self.profiler.engine()) {
                warn!("profile: could not write {}: {e}", self.path.display());
            }
        }
        if !self.config.quiet {
            info!("profile: {} disabled, {}", self.config.mode.label(), self.path.display());
        }
        true
    }
}

/// Handle to a running session.
///
/// Profiling continues until [`Profile::stop`] is called, explicitly or by
/// the shutdown hook. Clones share the same session.
#[derive(Clone)]
#[must_use = "profiling runs until `stop` is called"]
pub struct Profile {
    session: Arc<Session>,
}

impl Profile {
    /// Stop profiling and flush the captured data. Only the first call has
    /// any effect.
    pub fn stop(&self) {
        if self.session.finish() {
            let profiler = &self.session.profiler;
            profiler.set_current(None);
            profiler.release();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.session.stopped.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> Mode {
        self.session.config.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.session.config
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.session.path
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("mode", &self.session.config.mode)
            .field("path", &self.session.path)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Print `err` and exit with status 1.
pub(crate) fn fatal(err: &ProfileError) -> ! {
    eprintln!("profile: {err}");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let profiler = Profiler::new(RuntimeEngine);
        assert!(!profiler.is_active());
        profiler.claim().unwrap();
        assert!(matches!(profiler.claim(), Err(ProfileError::AlreadyStarted)));
        profiler.release();
        profiler.claim().unwrap();
        assert!(profiler.is_active());
    }

    #[test]
    fn test_invalid_filename_leaves_flag_unset() {
        let profiler = Profiler::new(RuntimeEngine);
        let err = profiler
            .try_start([ProfileOption::ProfileFilename("a/b".into())])
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidFilename(_)));
        assert!(!profiler.is_active());
    }

    #[test]
    fn test_goroutine_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::new(RuntimeEngine);
        let profile = profiler
            .try_start([
                ProfileOption::GoroutineProfile,
                ProfileOption::ProfilePath(dir.path().to_path_buf()),
                ProfileOption::NoShutdownHook,
                ProfileOption::Quiet,
            ])
            .unwrap();
        assert!(profiler.is_active());
        assert_eq!(profile.path(), dir.path().join("goroutine.pprof"));

        profile.stop();
        assert!(profile.is_stopped());
        assert!(!profiler.is_active());
        assert!(dir.path().join("goroutine.pprof").exists());
    }

    fn goroutine_options(dir: &Path, filename: &str) -> Vec<ProfileOption> {
        vec![
            ProfileOption::GoroutineProfile,
            ProfileOption::ProfilePath(dir.to_path_buf()),
            ProfileOption::ProfileFilename(filename.to_string()),
            ProfileOption::Quiet,
        ]
    }

    #[test]
    fn test_interrupt_ignores_session_without_hook() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::new(RuntimeEngine);
        assert!(!profiler.stop_on_interrupt());

        let mut options = goroutine_options(dir.path(), "unhooked.pprof");
        options.push(ProfileOption::NoShutdownHook);
        let profile = profiler.try_start(options).unwrap();

        assert!(!profiler.stop_on_interrupt());
        assert!(!profile.is_stopped());
        assert!(profiler.is_active());
        profile.stop();
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_shutdown_hook_armed_once_per_profiler() {
        use crate::engine::threads::list_threads;

        let listeners = || {
            list_threads().unwrap().iter().filter(|t| t.name == shutdown::THREAD_NAME).count()
        };
        let before = listeners();

        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::new(RuntimeEngine);
        for round in 0..5 {
            let filename = format!("{round}.pprof");
            profiler.try_start(goroutine_options(dir.path(), &filename)).unwrap().stop();
        }
        assert_eq!(listeners(), before + 1);

        // The single listener targets whichever session is current
        let profile = profiler.try_start(goroutine_options(dir.path(), "live.pprof")).unwrap();
        assert!(profiler.stop_on_interrupt());
        assert!(profile.is_stopped());
        assert!(!profiler.is_active());
        assert!(dir.path().join("live.pprof").metadata().unwrap().len() > 0);
        assert!(!profiler.stop_on_interrupt());
        assert_eq!(listeners(), before + 1);
    }
}
