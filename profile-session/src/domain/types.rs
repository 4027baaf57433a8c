//! Core domain types
//!
//! A session runs exactly one [`Mode`]. Each mode owns a default output
//! filename and a human-readable label used in start/stop messages.

use std::fmt;

/// Default memory profiling rate (sample roughly one allocation per 4 KiB).
pub const DEFAULT_MEM_PROFILE_RATE: usize = 4096;

/// Named profiles the instrumentation engine may expose.
pub mod profile_names {
    pub const HEAP: &str = "heap";
    pub const ALLOCS: &str = "allocs";
    pub const MUTEX: &str = "mutex";
    pub const BLOCK: &str = "block";
    pub const THREAD_CREATE: &str = "threadcreate";
    pub const GOROUTINE: &str = "goroutine";
}

/// The kind of runtime introspection a session performs.
///
/// `Cpu` is the default when no option selects a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum Mode {
    #[default]
    Cpu,
    Memory,
    Mutex,
    Block,
    Trace,
    ThreadCreate,
    Goroutine,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Cpu,
        Mode::Memory,
        Mode::Mutex,
        Mode::Block,
        Mode::Trace,
        Mode::ThreadCreate,
        Mode::Goroutine,
    ];

    /// Output filename used when no explicit filename is configured.
    pub fn default_filename(self) -> &'static str {
        match self {
            Mode::Cpu => "cpu.pprof",
            Mode::Memory => "mem.pprof",
            Mode::Mutex => "mutex.pprof",
            Mode::Block => "block.pprof",
            Mode::Trace => "trace.out",
            Mode::ThreadCreate => "threadcreation.pprof",
            Mode::Goroutine => "goroutine.pprof",
        }
    }

    /// Label used in "enabled"/"disabled" messages, e.g. `cpu profiling`.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Cpu => "cpu profiling",
            Mode::Memory => "memory profiling",
            Mode::Mutex => "mutex profiling",
            Mode::Block => "block profiling",
            Mode::Trace => "trace",
            Mode::ThreadCreate => "thread creation profiling",
            Mode::Goroutine => "goroutine profiling",
        }
    }

    /// Noun used in file creation errors, e.g. `could not create cpu profile`.
    pub fn artifact(self) -> &'static str {
        match self {
            Mode::Cpu => "cpu profile",
            Mode::Memory => "memory profile",
            Mode::Mutex => "mutex profile",
            Mode::Block => "block profile",
            Mode::Trace => "trace output file",
            Mode::ThreadCreate => "thread creation profile",
            Mode::Goroutine => "goroutine profile",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Cpu => "cpu",
            Mode::Memory => "memory",
            Mode::Mutex => "mutex",
            Mode::Block => "block",
            Mode::Trace => "trace",
            Mode::ThreadCreate => "thread-create",
            Mode::Goroutine => "goroutine",
        };
        f.write_str(name)
    }
}

/// Which memory profile Memory mode writes on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MemoryKind {
    /// Live (in-use) allocations plus cumulative totals
    #[default]
    Heap,
    /// Cumulative allocations since the process started sampling
    Allocs,
}

impl MemoryKind {
    /// Engine profile name for this kind.
    pub fn profile_name(self) -> &'static str {
        match self {
            MemoryKind::Heap => profile_names::HEAP,
            MemoryKind::Allocs => profile_names::ALLOCS,
        }
    }
}
