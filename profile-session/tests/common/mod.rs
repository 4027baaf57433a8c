//! Counting fake engine shared by the integration tests
#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use profile_session::engine::{CpuCapture, Engine, NamedProfile};
use profile_session::output::Sink;
use profile_session::{Mode, ProfileError, ProfileOption};

/// Memory rate the fake reports before any session touches it
pub const FAKE_INITIAL_RATE: usize = 1234;

pub struct FakeState {
    pub mem_rate: AtomicUsize,
    pub mutex_fraction: AtomicU32,
    pub block_rate: AtomicU64,
    pub cpu_starts: AtomicUsize,
    pub cpu_finishes: AtomicUsize,
    pub lookups: Mutex<Vec<String>>,
    pub trace_sink: Mutex<Option<Sink>>,
    pub trace_stops: AtomicUsize,
    pub fail_trace: bool,
    pub missing: Vec<&'static str>,
    /// Time each named profile takes to write
    pub write_delay: Duration,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            mem_rate: AtomicUsize::new(FAKE_INITIAL_RATE),
            mutex_fraction: AtomicU32::new(0),
            block_rate: AtomicU64::new(0),
            cpu_starts: AtomicUsize::new(0),
            cpu_finishes: AtomicUsize::new(0),
            lookups: Mutex::new(Vec::new()),
            trace_sink: Mutex::new(None),
            trace_stops: AtomicUsize::new(0),
            fail_trace: false,
            missing: Vec::new(),
            write_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    pub state: Arc<FakeState>,
}

impl FakeEngine {
    pub fn with_state(state: FakeState) -> Self {
        Self { state: Arc::new(state) }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lookups.lock().unwrap().clone()
    }

    pub fn mem_rate(&self) -> usize {
        self.state.mem_rate.load(Ordering::SeqCst)
    }

    /// Number of cleanup actions observed across all modes
    pub fn cleanups(&self) -> usize {
        self.lookups().len()
            + self.state.cpu_finishes.load(Ordering::SeqCst)
            + self.state.trace_stops.load(Ordering::SeqCst)
    }
}

struct FakeCapture {
    state: Arc<FakeState>,
}

impl CpuCapture for FakeCapture {
    fn finish(self: Box<Self>, out: &mut dyn Write) -> io::Result<()> {
        self.state.cpu_finishes.fetch_add(1, Ordering::SeqCst);
        writeln!(out, "fake cpu")
    }
}

struct FakeProfile {
    name: String,
    delay: Duration,
}

impl NamedProfile for FakeProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        std::thread::sleep(self.delay);
        writeln!(out, "fake {}", self.name)
    }
}

impl Engine for FakeEngine {
    fn start_cpu(&self) -> Result<Box<dyn CpuCapture>, ProfileError> {
        self.state.cpu_starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture { state: Arc::clone(&self.state) }))
    }

    fn memory_sample_rate(&self) -> usize {
        self.state.mem_rate.load(Ordering::SeqCst)
    }

    fn set_memory_sample_rate(&self, rate: usize) {
        self.state.mem_rate.store(rate, Ordering::SeqCst);
    }

    fn mutex_fraction(&self) -> u32 {
        self.state.mutex_fraction.load(Ordering::SeqCst)
    }

    fn set_mutex_fraction(&self, fraction: u32) -> u32 {
        self.state.mutex_fraction.swap(fraction, Ordering::SeqCst)
    }

    fn block_rate(&self) -> u64 {
        self.state.block_rate.load(Ordering::SeqCst)
    }

    fn set_block_rate(&self, rate: u64) {
        self.state.block_rate.store(rate, Ordering::SeqCst);
    }

    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>> {
        self.state.lookups.lock().unwrap().push(name.to_string());
        if self.state.missing.iter().any(|missing| *missing == name) {
            return None;
        }
        Some(Box::new(FakeProfile { name: name.to_string(), delay: self.state.write_delay }))
    }

    fn start_trace(&self, mut sink: Sink) -> Result<(), ProfileError> {
        if self.state.fail_trace {
            return Err(ProfileError::TraceStart("tracer unavailable".to_string()));
        }
        writeln!(sink, "fake trace").map_err(ProfileError::Io)?;
        *self.state.trace_sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop_trace(&self) -> io::Result<()> {
        self.state.trace_stops.fetch_add(1, Ordering::SeqCst);
        match self.state.trace_sink.lock().unwrap().take() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

/// Option that selects `mode`
pub fn mode_option(mode: Mode) -> ProfileOption {
    match mode {
        Mode::Cpu => ProfileOption::CpuProfile,
        Mode::Memory => ProfileOption::MemProfile,
        Mode::Mutex => ProfileOption::MutexProfile,
        Mode::Block => ProfileOption::BlockProfile,
        Mode::Trace => ProfileOption::TraceProfile,
        Mode::ThreadCreate => ProfileOption::ThreadCreationProfile,
        Mode::Goroutine => ProfileOption::GoroutineProfile,
    }
}

/// Options every fake-engine session uses: quiet, no SIGINT hook, `dir`
pub fn base_options(dir: &std::path::Path) -> Vec<ProfileOption> {
    vec![
        ProfileOption::Quiet,
        ProfileOption::NoShutdownHook,
        ProfileOption::ProfilePath(dir.to_path_buf()),
    ]
}
