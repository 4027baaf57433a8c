//! Trace export functionality
//!
//! Execution traces are streamed in Chrome Trace Event Format, viewable in
//! Perfetto, Speedscope or `chrome://tracing`.

pub mod chrome_trace;

pub use chrome_trace::{trace_layer, TraceLayer};
