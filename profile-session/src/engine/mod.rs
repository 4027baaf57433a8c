//! Instrumentation engine seam
//!
//! The session core never samples anything itself. It flips the engine's
//! process-wide knobs, starts and stops captures, and asks for named
//! profiles to persist. [`RuntimeEngine`] is the in-process implementation;
//! tests and embedders can supply their own [`Engine`].
//!
//! - `cpu`: CPU sampling through pprof-rs
//! - `alloc`: sampling global allocator backing `heap`/`allocs`
//! - `contention`: mutex/block knobs and recording helpers
//! - `threads`: OS thread inspection backing `threadcreate`/`goroutine`
//! - `runtime`: wires the above into one [`Engine`]

pub mod alloc;
pub mod contention;
pub mod cpu;
pub mod runtime;
pub mod threads;

use std::io::{self, Write};

use crate::domain::ProfileError;
use crate::output::Sink;

pub use runtime::RuntimeEngine;

/// A running CPU capture. Finishing it stops sampling and writes the
/// collected profile.
pub trait CpuCapture: Send {
    /// Stop sampling and write the profile to `out`.
    ///
    /// # Errors
    /// Returns an error if the report cannot be built or written
    fn finish(self: Box<Self>, out: &mut dyn Write) -> io::Result<()>;
}

/// A named profile the engine can serialize on demand.
pub trait NamedProfile {
    fn name(&self) -> &str;

    /// Write the current state of the profile to `out`.
    ///
    /// # Errors
    /// Returns an error if writing fails
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Process-wide instrumentation facilities.
///
/// The knobs are singletons per process, which is why only one session may
/// run at a time.
pub trait Engine: Send + Sync {
    /// Begin continuous CPU sampling.
    ///
    /// # Errors
    /// Returns [`ProfileError::CpuStart`] if sampling cannot be started
    fn start_cpu(&self) -> Result<Box<dyn CpuCapture>, ProfileError>;

    fn memory_sample_rate(&self) -> usize;
    fn set_memory_sample_rate(&self, rate: usize);

    fn mutex_fraction(&self) -> u32;
    /// Set the mutex contention sampling fraction, returning the previous value.
    fn set_mutex_fraction(&self, fraction: u32) -> u32;

    fn block_rate(&self) -> u64;
    fn set_block_rate(&self, rate: u64);

    /// Look up a named profile. `None` when the engine does not provide it.
    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>>;

    /// Start execution tracing into `sink`. The tracer owns the sink until
    /// [`Engine::stop_trace`] flushes and closes it.
    ///
    /// # Errors
    /// Returns [`ProfileError::TraceStart`] if a trace is already running
    fn start_trace(&self, sink: Sink) -> Result<(), ProfileError>;

    /// Stop tracing, flushing and closing the sink.
    ///
    /// # Errors
    /// Returns an error if the trace trailer cannot be written
    fn stop_trace(&self) -> io::Result<()>;
}
