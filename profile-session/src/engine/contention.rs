//! Mutex contention and blocking profiles
//!
//! Rust has no runtime hook for lock waits, so host code reports them.
//! [`lock_profiled`] and [`time_blocking`] measure the wait themselves;
//! [`record_mutex_contention`] and [`record_blocking`] accept a measured
//! duration. Events are aggregated per call site (via `#[track_caller]`)
//! and only recorded while the matching knob is enabled.
//!
//! - mutex fraction `n`: record one in `n` contention events, 0 = off
//! - block rate `r`: record every blocking event lasting at least `r` ns;
//!   shorter events accumulate and one is recorded per `r` ns of total delay

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{LockResult, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use super::NamedProfile;
use crate::domain::types::profile_names;

static MUTEX_FRACTION: AtomicU32 = AtomicU32::new(0);
static MUTEX_EVENTS: AtomicU64 = AtomicU64::new(0);
static BLOCK_RATE: AtomicU64 = AtomicU64::new(0);
static BLOCK_PENDING_NS: AtomicU64 = AtomicU64::new(0);

static MUTEX_TABLE: ContentionTable = ContentionTable::new();
static BLOCK_TABLE: ContentionTable = ContentionTable::new();

pub fn mutex_profile_fraction() -> u32 {
    MUTEX_FRACTION.load(Ordering::Relaxed)
}

/// Set the mutex sampling fraction and return the previous value.
pub fn set_mutex_profile_fraction(fraction: u32) -> u32 {
    MUTEX_FRACTION.swap(fraction, Ordering::Relaxed)
}

pub fn block_profile_rate() -> u64 {
    BLOCK_RATE.load(Ordering::Relaxed)
}

pub fn set_block_profile_rate(rate: u64) {
    BLOCK_RATE.store(rate, Ordering::Relaxed);
    BLOCK_PENDING_NS.store(0, Ordering::Relaxed);
}

/// Aggregated waits at one call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub count: u64,
    pub total_ns: u64,
}

type SiteKey = &'static Location<'static>;

struct ContentionTable {
    sites: Mutex<BTreeMap<SiteKey, SiteStats>>,
}

impl ContentionTable {
    const fn new() -> Self {
        Self { sites: Mutex::new(BTreeMap::new()) }
    }

    fn record(&self, site: SiteKey, wait: Duration) {
        let mut sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = sites.entry(site).or_default();
        stats.count += 1;
        stats.total_ns = stats.total_ns.saturating_add(duration_ns(wait));
    }

    fn snapshot(&self) -> Vec<(SiteKey, SiteStats)> {
        let sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        sites.iter().map(|(site, stats)| (*site, *stats)).collect()
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Report that the caller waited `wait` to acquire a lock.
#[track_caller]
pub fn record_mutex_contention(wait: Duration) {
    let fraction = mutex_profile_fraction();
    if fraction == 0 {
        return;
    }
    if MUTEX_EVENTS.fetch_add(1, Ordering::Relaxed) % u64::from(fraction) != 0 {
        return;
    }
    MUTEX_TABLE.record(Location::caller(), wait);
}

/// Report that the caller was blocked for `delay`.
#[track_caller]
pub fn record_blocking(delay: Duration) {
    let rate = block_profile_rate();
    if rate == 0 {
        return;
    }
    let ns = duration_ns(delay);
    if ns < rate {
        let pending = BLOCK_PENDING_NS.fetch_add(ns, Ordering::Relaxed).saturating_add(ns);
        if pending < rate {
            return;
        }
        BLOCK_PENDING_NS.store(0, Ordering::Relaxed);
    }
    BLOCK_TABLE.record(Location::caller(), delay);
}

/// Lock `mutex`, recording the wait if the lock was contended.
///
/// # Errors
/// Returns the poison error of the underlying mutex
#[track_caller]
pub fn lock_profiled<T>(mutex: &Mutex<T>) -> LockResult<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => return Ok(guard),
        Err(TryLockError::Poisoned(poisoned)) => return Err(poisoned),
        Err(TryLockError::WouldBlock) => {}
    }
    let start = Instant::now();
    let result = mutex.lock();
    record_mutex_contention(start.elapsed());
    result
}

/// Run a blocking operation and record how long it took.
#[track_caller]
pub fn time_blocking<R>(f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    record_blocking(start.elapsed());
    result
}

/// `mutex` or `block` profile over the recorded call sites.
pub struct ContentionProfile {
    name: &'static str,
    table: &'static ContentionTable,
    period: u64,
}

pub fn mutex_profile() -> ContentionProfile {
    ContentionProfile {
        name: profile_names::MUTEX,
        table: &MUTEX_TABLE,
        period: u64::from(mutex_profile_fraction()),
    }
}

pub fn block_profile() -> ContentionProfile {
    ContentionProfile {
        name: profile_names::BLOCK,
        table: &BLOCK_TABLE,
        period: block_profile_rate(),
    }
}

impl ContentionProfile {
    pub fn sites(&self) -> Vec<(&'static Location<'static>, SiteStats)> {
        self.table.snapshot()
    }
}

impl NamedProfile for ContentionProfile {
    fn name(&self) -> &str {
        self.name
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut sites = self.table.snapshot();
        sites.sort_by(|a, b| b.1.total_ns.cmp(&a.1.total_ns));

        writeln!(out, "--- {} contention:", self.name)?;
        writeln!(out, "cycles/second=1000000000")?;
        writeln!(out, "sampling period={}", self.period)?;
        for (site, stats) in sites {
            writeln!(
                out,
                "{} {} @ {}:{}:{}",
                stats.total_ns,
                stats.count,
                site.file(),
                site.line(),
                site.column()
            )?;
        }
        Ok(())
    }
}
