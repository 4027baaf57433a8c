//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::ProfileOption;
use crate::domain::{MemoryKind, Mode};

#[derive(Parser, Debug)]
#[command(
    name = "profile-run",
    about = "Run a synthetic workload under a profiling session",
    after_help = "\
EXAMPLES:
    profile-run --mode cpu --duration 5               CPU profile into a fresh temp dir
    profile-run --mode memory --mem-rate 512 -o out   Memory profile into ./out/mem.pprof
    profile-run --mode trace --duration 0             Trace until Ctrl+C"
)]
pub struct Args {
    /// Profiling mode
    #[arg(short, long, value_enum, default_value_t = Mode::Cpu)]
    pub mode: Mode,

    /// Directory for the profile (default: fresh temporary directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Profile filename, without path elements
    #[arg(short, long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Memory sampling rate in bytes (memory mode)
    #[arg(long, value_name = "BYTES")]
    pub mem_rate: Option<usize>,

    /// Memory profile kind (memory mode)
    #[arg(long, value_enum)]
    pub mem_kind: Option<MemoryKind>,

    /// Stop after N seconds (0 = run until interrupted)
    #[arg(long, default_value = "2")]
    pub duration: u64,

    /// Do not stop the session on Ctrl+C
    #[arg(long)]
    pub no_shutdown_hook: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Translate the flags into session options, mode first so the
    /// memory-specific flags refine it.
    pub fn profile_options(&self) -> Vec<ProfileOption> {
        let mut options = vec![match self.mode {
            Mode::Cpu => ProfileOption::CpuProfile,
            Mode::Memory => ProfileOption::MemProfile,
            Mode::Mutex => ProfileOption::MutexProfile,
            Mode::Block => ProfileOption::BlockProfile,
            Mode::Trace => ProfileOption::TraceProfile,
            Mode::ThreadCreate => ProfileOption::ThreadCreationProfile,
            Mode::Goroutine => ProfileOption::GoroutineProfile,
        }];

        if self.mode == Mode::Memory {
            if let Some(rate) = self.mem_rate {
                options.push(ProfileOption::MemProfileRate(rate));
            }
            match self.mem_kind {
                Some(MemoryKind::Heap) => options.push(ProfileOption::MemProfileHeap),
                Some(MemoryKind::Allocs) => options.push(ProfileOption::MemProfileAllocs),
                None => {}
            }
        }
        if let Some(dir) = &self.output_dir {
            options.push(ProfileOption::ProfilePath(dir.clone()));
        }
        if let Some(name) = &self.filename {
            options.push(ProfileOption::ProfileFilename(name.clone()));
        }
        if self.no_shutdown_hook {
            options.push(ProfileOption::NoShutdownHook);
        }
        if self.quiet {
            options.push(ProfileOption::Quiet);
        }
        options
    }
}
