//! # profile-session - One-shot profiling sessions
//!
//! Enables exactly one kind of runtime introspection for a bounded span of
//! a program and guarantees the captured data reaches disk exactly once,
//! including when the process is interrupted.
//!
//! ## Architecture Overview
//!
//! ```text
//! options ──▶ config ──▶ session ──▶ output (dir + file sink)
//!                           │
//!                           ├──▶ strategy ──▶ engine (cpu / alloc / contention /
//!                           │                        threads / export::chrome_trace)
//!                           │
//!                           └──▶ shutdown (SIGINT ─▶ stop ─▶ exit 0)
//! ```
//!
//! ## Module Structure
//!
//! - [`config`]: option list folded into an immutable [`SessionConfig`]
//! - [`output`]: output directory resolution and the file [`Sink`](output::Sink)
//! - [`strategy`]: per-mode activation and the [`Closer`](strategy::Closer) that undoes it
//! - [`session`]: single-session admission, the [`Profile`] handle and idempotent stop
//! - [`shutdown`]: optional SIGINT hook
//! - [`engine`]: instrumentation seam plus the in-process [`RuntimeEngine`]
//! - [`export`]: Chrome Trace Event streaming for Trace mode
//! - [`cli`]: arguments of the `profile-run` demo binary
//! - [`domain`]: modes, memory kinds, errors
//!
//! ## Modes and Output Files
//!
//! | Mode | Default file | Source |
//! |------|--------------|--------|
//! | CPU | `cpu.pprof` | pprof-rs sampling at 100 Hz, folded stacks |
//! | Memory | `mem.pprof` | [`SamplingAllocator`] (`heap` or `allocs`) |
//! | Mutex | `mutex.pprof` | [`lock_profiled`] / [`record_mutex_contention`] |
//! | Block | `block.pprof` | [`time_blocking`] / [`record_blocking`] |
//! | Trace | `trace.out` | `tracing` spans and events via [`trace_layer`] |
//! | ThreadCreate | `threadcreation.pprof` | `/proc/self/task` grouped by name |
//! | Goroutine | `goroutine.pprof` | `/proc/self/task` per-thread dump |
//!
//! ## Typical Usage
//!
//! ```no_run
//! use profile_session::ProfileOption;
//!
//! let profile = profile_session::start([
//!     ProfileOption::MemProfileRate(512),
//!     ProfileOption::ProfilePath("/tmp/prof".into()),
//! ]);
//! // ... workload ...
//! profile.stop();
//! ```
//!
//! Setup failures (second concurrent start, filename with path elements,
//! unwritable directory) terminate the process. [`try_start`] returns them
//! instead.

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod export;
pub mod output;
pub mod session;
pub mod shutdown;
pub mod strategy;

pub use config::{ProfileOption, SessionConfig};
pub use domain::{MemoryKind, Mode, ProfileError, DEFAULT_MEM_PROFILE_RATE};
pub use engine::alloc::SamplingAllocator;
pub use engine::contention::{
    lock_profiled, record_blocking, record_mutex_contention, time_blocking,
};
pub use engine::{Engine, RuntimeEngine};
pub use export::trace_layer;
pub use session::{Profile, Profiler};

/// Start a session on the process-wide [`Profiler`], exiting the process if
/// setup fails.
pub fn start<I>(options: I) -> Profile
where
    I: IntoIterator<Item = ProfileOption>,
{
    Profiler::global().start(options)
}

/// Start a session on the process-wide [`Profiler`].
///
/// # Errors
/// See [`Profiler::try_start`]
pub fn try_start<I>(options: I) -> Result<Profile, ProfileError>
where
    I: IntoIterator<Item = ProfileOption>,
{
    Profiler::global().try_start(options)
}
