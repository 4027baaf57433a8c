//! # profile-run - Demo Entry Point
//!
//! Starts a profiling session from CLI flags, drives a synthetic workload
//! that exercises every mode, then stops the session. With `--duration 0`
//! it runs until Ctrl+C, leaving the stop to the shutdown hook.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;

use profile_session::cli::Args;
use profile_session::{
    lock_profiled, time_blocking, trace_layer, Mode, Profiler, SamplingAllocator,
};

#[global_allocator]
static GLOBAL: SamplingAllocator = SamplingAllocator::system();

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

const WORKER_THREADS: usize = 3;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version are reported through the same path
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run(args: &Args) -> Result<()> {
    // Trace mode records the workload's spans
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(trace_layer()))
        .context("Failed to install tracing subscriber")?;

    // Setup errors are fatal inside start()
    let profile = Profiler::global().start(args.profile_options());

    // Supervisors wait for this line before signalling
    let mut stdout = std::io::stdout();
    writeln!(stdout, "ready {}", profile.path().display())?;
    stdout.flush()?;

    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    run_workload(profile.mode(), deadline);

    profile.stop();
    if !args.quiet {
        info!("saved: {}", profile.path().display());
    }
    Ok(())
}

/// Spin, allocate, contend and block on a few named threads until the
/// deadline. Without a deadline this only returns if the process is
/// interrupted, which the shutdown hook turns into an exit.
fn run_workload(mode: Mode, deadline: Option<Instant>) {
    let running = Arc::new(AtomicBool::new(true));
    let shared = Arc::new(Mutex::new(Vec::<u64>::new()));

    let workers: Vec<_> = (0..WORKER_THREADS)
        .filter_map(|idx| {
            let running = Arc::clone(&running);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name(format!("worker-{idx}"))
                .spawn(move || worker_loop(idx, &running, &shared))
                .ok()
        })
        .collect();

    info!("workload running ({mode} mode, {} workers)", workers.len());
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    running.store(false, Ordering::Relaxed);
    join_workers(workers);
}

/// Join every worker, logging the ones that panicked. Returns how many did.
fn join_workers(workers: Vec<JoinHandle<()>>) -> usize {
    let mut panicked = 0;
    for worker in workers {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        if worker.join().is_err() {
            warn!("{name} panicked");
            panicked += 1;
        }
    }
    panicked
}

fn worker_loop(idx: usize, running: &AtomicBool, shared: &Mutex<Vec<u64>>) {
    let mut round: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let _span = tracing::info_span!("round", worker = idx, round).entered();

        let checksum = spin(20_000 + round % 7);
        let buffer: Vec<u8> = vec![0xAB; 1024 * (idx + 1)];
        tracing::debug!(bytes = buffer.len(), "allocated buffer");

        if let Ok(mut values) = lock_profiled(shared) {
            values.push(checksum);
            if values.len() > 1024 {
                values.clear();
            }
            // Hold the lock briefly so other workers contend
            std::thread::sleep(Duration::from_micros(200));
        }

        time_blocking(|| std::thread::sleep(Duration::from_millis(2)));
        round += 1;
    }
}

fn spin(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, i| acc.wrapping_mul(31).wrapping_add(i ^ (acc >> 3)))
}
