//! In-process instrumentation engine
//!
//! Binds the [`Engine`] seam to the process-wide facilities in this crate:
//! pprof-rs for CPU, the sampling allocator, the contention knobs, procfs
//! thread inspection and the `tracing`-fed execution tracer.

use std::io;

use super::alloc::{self, MemoryProfile};
use super::contention;
use super::cpu::PprofCapture;
use super::threads;
use super::{CpuCapture, Engine, NamedProfile};
use crate::domain::types::profile_names;
use crate::domain::{MemoryKind, ProfileError};
use crate::export::chrome_trace;
use crate::output::Sink;

#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeEngine;

impl Engine for RuntimeEngine {
    fn start_cpu(&self) -> Result<Box<dyn CpuCapture>, ProfileError> {
        Ok(Box::new(PprofCapture::start()?))
    }

    fn memory_sample_rate(&self) -> usize {
        alloc::mem_profile_rate()
    }

    fn set_memory_sample_rate(&self, rate: usize) {
        alloc::set_mem_profile_rate(rate);
    }

    fn mutex_fraction(&self) -> u32 {
        contention::mutex_profile_fraction()
    }

    fn set_mutex_fraction(&self, fraction: u32) -> u32 {
        contention::set_mutex_profile_fraction(fraction)
    }

    fn block_rate(&self) -> u64 {
        contention::block_profile_rate()
    }

    fn set_block_rate(&self, rate: u64) {
        contention::set_block_profile_rate(rate);
    }

    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>> {
        match name {
            profile_names::HEAP => Some(Box::new(MemoryProfile::new(MemoryKind::Heap))),
            profile_names::ALLOCS => Some(Box::new(MemoryProfile::new(MemoryKind::Allocs))),
            profile_names::MUTEX => Some(Box::new(contention::mutex_profile())),
            profile_names::BLOCK => Some(Box::new(contention::block_profile())),
            profile_names::THREAD_CREATE => threads::thread_create_profile()
                .map(|p| Box::new(p) as Box<dyn NamedProfile>),
            profile_names::GOROUTINE => {
                threads::thread_dump_profile().map(|p| Box::new(p) as Box<dyn NamedProfile>)
            }
            _ => None,
        }
    }

    fn start_trace(&self, sink: Sink) -> Result<(), ProfileError> {
        chrome_trace::start(sink)
    }

    fn stop_trace(&self) -> io::Result<()> {
        chrome_trace::stop()
    }
}
