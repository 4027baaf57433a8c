//! Sampling global allocator backing the `heap` and `allocs` profiles
//!
//! Install it in the host binary:
//!
//! ```ignore
//! use profile_session::SamplingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: SamplingAllocator = SamplingAllocator::system();
//! ```
//!
//! Each thread samples roughly one allocation per `rate` bytes, where `rate`
//! is the process-wide memory profiling rate (0 disables sampling). Sampled
//! blocks are tracked until freed so the heap profile can report in-use
//! memory. Statistics are bucketed by power-of-two size class.

#![allow(unsafe_code)] // GlobalAlloc is an unsafe trait

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::NamedProfile;
use crate::domain::MemoryKind;

/// Memory profiling rate in effect before any session changes it
pub const INITIAL_MEM_PROFILE_RATE: usize = 512 * 1024;

const SIZE_CLASSES: usize = usize::BITS as usize + 1;

static MEM_PROFILE_RATE: AtomicUsize = AtomicUsize::new(INITIAL_MEM_PROFILE_RATE);

struct ClassStats {
    alloc_objects: AtomicU64,
    alloc_bytes: AtomicU64,
    free_objects: AtomicU64,
    free_bytes: AtomicU64,
}

impl ClassStats {
    const fn new() -> Self {
        Self {
            alloc_objects: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            free_objects: AtomicU64::new(0),
            free_bytes: AtomicU64::new(0),
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_CLASS: ClassStats = ClassStats::new();
static STATS: [ClassStats; SIZE_CLASSES] = [EMPTY_CLASS; SIZE_CLASSES];

/// Live sampled blocks: address -> size
static LIVE: Mutex<Option<HashMap<usize, usize>>> = Mutex::new(None);
static LIVE_COUNT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
    static NEXT_SAMPLE: Cell<usize> = const { Cell::new(0) };
}

pub fn mem_profile_rate() -> usize {
    MEM_PROFILE_RATE.load(Ordering::Relaxed)
}

pub fn set_mem_profile_rate(rate: usize) {
    MEM_PROFILE_RATE.store(rate, Ordering::Relaxed);
}

/// Global allocator wrapper that feeds the memory profiles.
pub struct SamplingAllocator<A = System> {
    inner: A,
}

impl SamplingAllocator<System> {
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> SamplingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for SamplingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            on_alloc(ptr as usize, layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            on_alloc(ptr as usize, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        on_dealloc(ptr as usize);
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let next = self.inner.realloc(ptr, layout, new_size);
        if !next.is_null() {
            on_dealloc(ptr as usize);
            on_alloc(next as usize, new_size);
        }
        next
    }
}

/// Run `f` unless this thread is already inside the profiler. Allocations
/// made by the bookkeeping itself pass straight through.
fn with_hook(f: impl FnOnce()) {
    let _ = IN_HOOK.try_with(|flag| {
        if flag.replace(true) {
            return;
        }
        f();
        flag.set(false);
    });
}

/// Decide whether an allocation of `size` bytes is sampled, given the
/// bytes left until the next sample on this thread.
fn should_sample(remaining: &Cell<usize>, size: usize, rate: usize) -> bool {
    let left = remaining.get();
    if size >= left {
        remaining.set(rate);
        true
    } else {
        remaining.set(left - size);
        false
    }
}

fn on_alloc(addr: usize, size: usize) {
    let rate = mem_profile_rate();
    if rate == 0 {
        return;
    }
    let sampled = NEXT_SAMPLE.try_with(|next| should_sample(next, size, rate)).unwrap_or(false);
    if sampled {
        with_hook(|| record_alloc(addr, size));
    }
}

fn on_dealloc(addr: usize) {
    if LIVE_COUNT.load(Ordering::Relaxed) == 0 {
        return;
    }
    with_hook(|| record_free(addr));
}

fn size_class(size: usize) -> usize {
    (usize::BITS - size.saturating_sub(1).leading_zeros()) as usize
}

fn record_alloc(addr: usize, size: usize) {
    let class = &STATS[size_class(size)];
    class.alloc_objects.fetch_add(1, Ordering::Relaxed);
    class.alloc_bytes.fetch_add(size as u64, Ordering::Relaxed);

    if let Ok(mut live) = LIVE.lock() {
        let live = live.get_or_insert_with(HashMap::new);
        live.insert(addr, size);
        LIVE_COUNT.store(live.len(), Ordering::Relaxed);
    }
}

fn record_free(addr: usize) {
    let Ok(mut live) = LIVE.lock() else {
        return;
    };
    let Some(live) = live.as_mut() else {
        return;
    };
    if let Some(size) = live.remove(&addr) {
        let class = &STATS[size_class(size)];
        class.free_objects.fetch_add(1, Ordering::Relaxed);
        class.free_bytes.fetch_add(size as u64, Ordering::Relaxed);
        LIVE_COUNT.store(live.len(), Ordering::Relaxed);
    }
}

/// Sampled statistics for one size class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassSnapshot {
    /// Largest allocation size in this class
    pub max_size: u128,
    pub alloc_objects: u64,
    pub alloc_bytes: u64,
    pub free_objects: u64,
    pub free_bytes: u64,
}

impl ClassSnapshot {
    pub fn inuse_objects(&self) -> u64 {
        self.alloc_objects.saturating_sub(self.free_objects)
    }

    pub fn inuse_bytes(&self) -> u64 {
        self.alloc_bytes.saturating_sub(self.free_bytes)
    }
}

/// Point-in-time copy of the allocator statistics.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    pub rate: usize,
    /// Non-empty size classes, smallest first
    pub classes: Vec<ClassSnapshot>,
}

impl MemorySnapshot {
    pub fn capture() -> Self {
        let classes = STATS
            .iter()
            .enumerate()
            .map(|(idx, class)| ClassSnapshot {
                max_size: 1u128 << idx,
                alloc_objects: class.alloc_objects.load(Ordering::Relaxed),
                alloc_bytes: class.alloc_bytes.load(Ordering::Relaxed),
                free_objects: class.free_objects.load(Ordering::Relaxed),
                free_bytes: class.free_bytes.load(Ordering::Relaxed),
            })
            .filter(|class| class.alloc_objects > 0)
            .collect();
        Self { rate: mem_profile_rate(), classes }
    }

    pub fn total(&self) -> ClassSnapshot {
        self.classes.iter().fold(ClassSnapshot::default(), |acc, c| ClassSnapshot {
            max_size: acc.max_size.max(c.max_size),
            alloc_objects: acc.alloc_objects + c.alloc_objects,
            alloc_bytes: acc.alloc_bytes + c.alloc_bytes,
            free_objects: acc.free_objects + c.free_objects,
            free_bytes: acc.free_bytes + c.free_bytes,
        })
    }
}

/// `heap` or `allocs` profile over the sampled statistics.
pub struct MemoryProfile {
    kind: MemoryKind,
}

impl MemoryProfile {
    pub fn new(kind: MemoryKind) -> Self {
        Self { kind }
    }
}

impl NamedProfile for MemoryProfile {
    fn name(&self) -> &str {
        self.kind.profile_name()
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let snapshot = MemorySnapshot::capture();
        let total = snapshot.total();
        match self.kind {
            MemoryKind::Heap => {
                writeln!(
                    out,
                    "heap profile: {}: {} [{}: {}] @ heap/{}",
                    total.inuse_objects(),
                    total.inuse_bytes(),
                    total.alloc_objects,
                    total.alloc_bytes,
                    snapshot.rate
                )?;
                for class in &snapshot.classes {
                    writeln!(
                        out,
                        "{}: {} [{}: {}] @ size<={}",
                        class.inuse_objects(),
                        class.inuse_bytes(),
                        class.alloc_objects,
                        class.alloc_bytes,
                        class.max_size
                    )?;
                }
            }
            MemoryKind::Allocs => {
                writeln!(
                    out,
                    "allocs profile: {}: {} @ allocs/{}",
                    total.alloc_objects, total.alloc_bytes, snapshot.rate
                )?;
                for class in &snapshot.classes {
                    writeln!(
                        out,
                        "{}: {} @ size<={}",
                        class.alloc_objects, class.alloc_bytes, class.max_size
                    )?;
                }
            }
        }
        Ok(())
    }
}
