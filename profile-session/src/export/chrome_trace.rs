//! Execution tracer
//!
//! A `tracing` layer that, while a trace session is active, streams span
//! enter/exit and events into the session's sink as Chrome Trace Events.
//! The host adds [`trace_layer`] to its subscriber once; it is inert until
//! a Trace-mode session starts.
//!
//! File layout:
//!
//! ```text
//! {"displayTimeUnit":"ms","traceEvents":[
//! {"name":"process_name","cat":"__metadata","ph":"M",...},
//! {"name":"request","cat":"app::server","ph":"B","ts":12.5,"pid":4242,"tid":1},
//! ...
//! ]}
//! ```

use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::domain::ProfileError;
use crate::output::Sink;

static TRACER: Mutex<Option<TraceWriter>> = Mutex::new(None);
static ACTIVE: AtomicBool = AtomicBool::new(false);
static NEXT_TID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TRACE_TID: Cell<u64> = const { Cell::new(0) };
}

/// Small sequential id for the current thread, stable for its lifetime.
fn current_tid() -> u64 {
    TRACE_TID
        .try_with(|tid| {
            if tid.get() == 0 {
                tid.set(NEXT_TID.fetch_add(1, Ordering::Relaxed));
            }
            tid.get()
        })
        .unwrap_or(0)
}

/// Chrome Trace Event
#[derive(Debug, Serialize)]
struct ChromeTraceEvent<'a> {
    name: &'a str,
    cat: &'a str,
    /// Phase: "B" = begin, "E" = end, "i" = instant, "M" = metadata
    ph: &'static str,
    /// Timestamp in microseconds since the trace started
    ts: f64,
    pid: u32,
    tid: u64,
    /// Instant event scope ("t" = thread)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, JsonValue>>,
}

struct TraceWriter {
    sink: Sink,
    started: Instant,
    pid: u32,
    events: u64,
}

impl TraceWriter {
    fn begin(mut sink: Sink) -> io::Result<Self> {
        sink.write_all(b"{\"displayTimeUnit\":\"ms\",\"traceEvents\":[\n")?;
        let mut writer = Self { sink, started: Instant::now(), pid: std::process::id(), events: 0 };

        let mut args = Map::new();
        args.insert("name".to_string(), JsonValue::from(process_name()));
        writer.write_event(&ChromeTraceEvent {
            name: "process_name",
            cat: "__metadata",
            ph: "M",
            ts: 0.0,
            pid: writer.pid,
            tid: 0,
            s: None,
            args: Some(args),
        })?;
        Ok(writer)
    }

    fn elapsed_us(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1_000_000.0
    }

    fn write_event(&mut self, event: &ChromeTraceEvent<'_>) -> io::Result<()> {
        if self.events > 0 {
            self.sink.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut self.sink, event)?;
        self.events += 1;
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.sink.write_all(b"\n]}\n")?;
        self.sink.close()
    }
}

fn process_name() -> String {
    std::env::args()
        .next()
        .and_then(|arg0| {
            std::path::Path::new(&arg0).file_name().map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "process".to_string())
}

/// Start streaming trace events into `sink`.
///
/// # Errors
/// Returns [`ProfileError::TraceStart`] if a trace is already running or the
/// trace header cannot be written
pub fn start(sink: Sink) -> Result<(), ProfileError> {
    let mut slot = TRACER.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(ProfileError::TraceStart("tracing is already enabled".to_string()));
    }
    let writer = TraceWriter::begin(sink).map_err(|e| ProfileError::TraceStart(e.to_string()))?;
    *slot = Some(writer);
    ACTIVE.store(true, Ordering::Release);
    Ok(())
}

/// Stop tracing, writing the trailer and closing the sink. No-op if no
/// trace is running.
///
/// # Errors
/// Returns an error if the trailer cannot be written or the sink closed
pub fn stop() -> io::Result<()> {
    ACTIVE.store(false, Ordering::Release);
    let writer = TRACER.lock().unwrap_or_else(PoisonError::into_inner).take();
    match writer {
        Some(writer) => writer.finish(),
        None => Ok(()),
    }
}

pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

fn record(name: &str, cat: &str, ph: &'static str, args: Option<Map<String, JsonValue>>) {
    let tid = current_tid();
    let written = {
        let mut slot = TRACER.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = slot.as_mut() else {
            return;
        };
        let event = ChromeTraceEvent {
            name,
            cat,
            ph,
            ts: writer.elapsed_us(),
            pid: writer.pid,
            tid,
            s: (ph == "i").then_some("t"),
            args,
        };
        writer.write_event(&event)
    };
    // Logged after unlocking: a log-to-tracing bridge lands back in record()
    if let Err(e) = written {
        log::warn!("profile: dropping trace event: {e}");
    }
}

/// Collects event fields into JSON args
struct FieldVisitor(Map<String, JsonValue>);

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), JsonValue::from(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), JsonValue::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), JsonValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), JsonValue::from(value));
    }
}

/// `tracing` layer feeding the execution tracer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceLayer;

/// Layer to add to the host's subscriber so Trace mode sessions see its
/// spans and events.
pub fn trace_layer() -> TraceLayer {
    TraceLayer
}

impl<S> Layer<S> for TraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_active() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            record(span.name(), span.metadata().target(), "B", None);
        }
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_active() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            record(span.name(), span.metadata().target(), "E", None);
        }
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !is_active() {
            return;
        }
        let mut visitor = FieldVisitor(Map::new());
        event.record(&mut visitor);
        let name = visitor
            .0
            .get("message")
            .and_then(JsonValue::as_str)
            .map_or_else(|| event.metadata().name().to_string(), str::to_string);
        record(&name, event.metadata().target(), "i", Some(visitor.0));
    }
}
