//! CPU sampling via pprof-rs
//!
//! Samples every thread at [`SAMPLE_FREQUENCY`] Hz using `SIGPROF`. The
//! report is written as folded stacks, one line per unique stack:
//!
//! ```text
//! # cpu profile: frequency=100 samples=42 duration_ms=1003
//! main;app::run;app::work 40
//! worker-1;std::thread::sleep 2
//! ```

use std::io::{self, Write};
use std::time::Instant;

use pprof::{ProfilerGuard, ProfilerGuardBuilder};

use super::CpuCapture;
use crate::domain::ProfileError;

/// Sampling frequency in Hz
pub const SAMPLE_FREQUENCY: i32 = 100;

/// Frames from these libraries are dropped from samples
const BLOCKLIST: [&str; 4] = ["libc", "libgcc", "pthread", "vdso"];

pub struct PprofCapture {
    guard: ProfilerGuard<'static>,
    started: Instant,
}

impl PprofCapture {
    /// Start sampling.
    ///
    /// # Errors
    /// Returns [`ProfileError::CpuStart`] if the sampler cannot be started,
    /// e.g. because another pprof guard is alive in this process
    pub fn start() -> Result<Self, ProfileError> {
        let guard = ProfilerGuardBuilder::default()
            .frequency(SAMPLE_FREQUENCY)
            .blocklist(&BLOCKLIST)
            .build()
            .map_err(|e| ProfileError::CpuStart(e.to_string()))?;
        Ok(Self { guard, started: Instant::now() })
    }
}

impl CpuCapture for PprofCapture {
    fn finish(self: Box<Self>, out: &mut dyn Write) -> io::Result<()> {
        let PprofCapture { guard, started } = *self;
        let report = guard.report().build().map_err(io::Error::other)?;
        let elapsed = started.elapsed();
        // Sampling stops when the guard drops
        drop(guard);

        let mut lines: Vec<(String, isize)> = report
            .data
            .iter()
            .map(|(frames, count)| {
                let mut names = vec![frames.thread_name.clone()];
                for symbols in frames.frames.iter().rev() {
                    for symbol in symbols.iter().rev() {
                        names.push(symbol.name());
                    }
                }
                (names.join(";"), *count)
            })
            .collect();
        lines.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let samples: isize = lines.iter().map(|(_, count)| count).sum();
        writeln!(
            out,
            "# cpu profile: frequency={SAMPLE_FREQUENCY} samples={samples} duration_ms={}",
            elapsed.as_millis()
        )?;
        for (stack, count) in lines {
            writeln!(out, "{stack} {count}")?;
        }
        Ok(())
    }
}
