//! OS thread inspection
//!
//! Backs the `threadcreate` and `goroutine` profiles by reading
//! `/proc/self/task`. Only available on Linux; elsewhere the profiles are
//! absent and sessions skip writing them.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::NamedProfile;
use crate::domain::types::profile_names;

const TASK_DIR: &str = "/proc/self/task";

/// One OS thread of the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: u32,
    pub name: String,
    /// Scheduler state from `/proc/<tid>/stat` (`R`, `S`, `D`, ...)
    pub state: char,
}

/// List the threads of the current process, sorted by TID.
///
/// # Errors
/// Returns an error if `/proc/self/task` cannot be read
pub fn list_threads() -> io::Result<Vec<ThreadInfo>> {
    let mut threads: Vec<ThreadInfo> = fs::read_dir(TASK_DIR)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let tid = entry.file_name().to_string_lossy().parse::<u32>().ok()?;

            // Threads can exit between read_dir and here
            let comm = fs::read_to_string(entry.path().join("comm")).ok()?;
            let stat = fs::read_to_string(entry.path().join("stat")).unwrap_or_default();

            Some(ThreadInfo { tid, name: comm.trim().to_string(), state: parse_state(&stat) })
        })
        .collect();
    threads.sort_by_key(|t| t.tid);
    Ok(threads)
}

/// Extract the state field from a `stat` line: `tid (comm) S ...`.
/// `comm` may itself contain spaces and parentheses.
fn parse_state(stat: &str) -> char {
    stat.rfind(')')
        .and_then(|idx| stat[idx + 1..].trim_start().chars().next())
        .unwrap_or('?')
}

/// Thread name with trailing worker numbering removed, so pools group
/// together (`worker-3` -> `worker`).
fn thread_group(name: &str) -> &str {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.trim_end_matches(['-', '_', '#', ' ']);
    if trimmed.is_empty() {
        name
    } else {
        trimmed
    }
}

fn procfs_available() -> bool {
    cfg!(target_os = "linux") && Path::new(TASK_DIR).is_dir()
}

/// Threads grouped by creator pool name.
pub struct ThreadCreateProfile;

/// Per-thread state dump.
pub struct ThreadDumpProfile;

pub fn thread_create_profile() -> Option<ThreadCreateProfile> {
    procfs_available().then_some(ThreadCreateProfile)
}

pub fn thread_dump_profile() -> Option<ThreadDumpProfile> {
    procfs_available().then_some(ThreadDumpProfile)
}

impl NamedProfile for ThreadCreateProfile {
    fn name(&self) -> &str {
        profile_names::THREAD_CREATE
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let threads = list_threads()?;
        let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
        for thread in &threads {
            *groups.entry(thread_group(&thread.name)).or_default() += 1;
        }

        writeln!(out, "threadcreate profile: total {}", threads.len())?;
        for (group, count) in groups {
            writeln!(out, "{count} @ {group}")?;
        }
        Ok(())
    }
}

impl NamedProfile for ThreadDumpProfile {
    fn name(&self) -> &str {
        profile_names::GOROUTINE
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let threads = list_threads()?;
        writeln!(out, "thread profile: total {}", threads.len())?;
        for thread in threads {
            writeln!(out, "tid {} [{}] {}", thread.tid, thread.state, thread.name)?;
        }
        Ok(())
    }
}
