//! Mode strategy table
//!
//! [`activate`] turns on the instrumentation for a session's mode and returns
//! a [`Closer`] holding exactly what teardown needs: the sink, a running
//! capture, or the knob value to restore.

use std::fmt;
use std::io;

use crate::config::SessionConfig;
use crate::domain::types::profile_names;
use crate::domain::{MemoryKind, Mode, ProfileError};
use crate::engine::{CpuCapture, Engine};
use crate::output::Sink;

/// Mode-specific teardown, consumed exactly once.
pub enum Closer {
    Cpu { sink: Sink, capture: Box<dyn CpuCapture> },
    Memory { sink: Sink, kind: MemoryKind, previous_rate: usize },
    Mutex { sink: Sink },
    Block { sink: Sink },
    ThreadCreate { sink: Sink },
    /// The tracer owns the sink
    Trace,
    Goroutine { sink: Sink },
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Closer::Cpu { sink, .. } => {
                f.debug_struct("Cpu").field("sink", sink).finish_non_exhaustive()
            }
            Closer::Memory { sink, kind, previous_rate } => f
                .debug_struct("Memory")
                .field("sink", sink)
                .field("kind", kind)
                .field("previous_rate", previous_rate)
                .finish(),
            Closer::Mutex { sink } => f.debug_struct("Mutex").field("sink", sink).finish(),
            Closer::Block { sink } => f.debug_struct("Block").field("sink", sink).finish(),
            Closer::ThreadCreate { sink } => {
                f.debug_struct("ThreadCreate").field("sink", sink).finish()
            }
            Closer::Trace => f.write_str("Trace"),
            Closer::Goroutine { sink } => f.debug_struct("Goroutine").field("sink", sink).finish(),
        }
    }
}

/// Activate instrumentation for `config.mode`, writing into `sink`.
///
/// # Errors
/// Returns an error if the engine refuses to start a CPU capture or a trace
pub fn activate(
    config: &SessionConfig,
    sink: Sink,
    engine: &dyn Engine,
) -> Result<Closer, ProfileError> {
    let closer = match config.mode {
        Mode::Cpu => {
            let capture = engine.start_cpu()?;
            Closer::Cpu { sink, capture }
        }
        Mode::Memory => {
            let previous_rate = engine.memory_sample_rate();
            engine.set_memory_sample_rate(config.memory_sample_rate);
            Closer::Memory { sink, kind: config.memory_kind, previous_rate }
        }
        Mode::Mutex => {
            engine.set_mutex_fraction(1);
            Closer::Mutex { sink }
        }
        Mode::Block => {
            engine.set_block_rate(1);
            Closer::Block { sink }
        }
        Mode::ThreadCreate => Closer::ThreadCreate { sink },
        Mode::Trace => {
            engine.start_trace(sink)?;
            Closer::Trace
        }
        Mode::Goroutine => Closer::Goroutine { sink },
    };
    Ok(closer)
}

impl Closer {
    pub fn mode(&self) -> Mode {
        match self {
            Closer::Cpu { .. } => Mode::Cpu,
            Closer::Memory { .. } => Mode::Memory,
            Closer::Mutex { .. } => Mode::Mutex,
            Closer::Block { .. } => Mode::Block,
            Closer::ThreadCreate { .. } => Mode::ThreadCreate,
            Closer::Trace => Mode::Trace,
            Closer::Goroutine { .. } => Mode::Goroutine,
        }
    }

    /// Deactivate instrumentation, persist the captured data and close the
    /// sink. Knobs are restored even when writing fails.
    ///
    /// # Errors
    /// Returns the first write or close error
    pub fn close(self, engine: &dyn Engine) -> io::Result<()> {
        match self {
            Closer::Cpu { mut sink, capture } => {
                let written = capture.finish(&mut sink);
                written.and(sink.close())
            }
            Closer::Memory { sink, kind, previous_rate } => {
                let result = write_named(engine, kind.profile_name(), sink);
                engine.set_memory_sample_rate(previous_rate);
                result
            }
            Closer::Mutex { sink } => {
                let result = write_named(engine, profile_names::MUTEX, sink);
                engine.set_mutex_fraction(0);
                result
            }
            Closer::Block { sink } => {
                let result = write_named(engine, profile_names::BLOCK, sink);
                engine.set_block_rate(0);
                result
            }
            Closer::ThreadCreate { sink } => {
                write_named(engine, profile_names::THREAD_CREATE, sink)
            }
            Closer::Trace => engine.stop_trace(),
            Closer::Goroutine { sink } => write_named(engine, profile_names::GOROUTINE, sink),
        }
    }
}

/// Write the named profile if the engine has it, then close the sink.
fn write_named(engine: &dyn Engine, name: &str, mut sink: Sink) -> io::Result<()> {
    let written = match engine.lookup(name) {
        Some(profile) => profile.write_to(&mut sink),
        None => Ok(()),
    };
    written.and(sink.close())
}
