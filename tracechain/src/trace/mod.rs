//! Span context, tracer, span and the exporter-sink boundary.
//!
//! Conceptually a trace is the set of all spans sharing one trace id,
//! representing a single logical end-to-end request; each span is one timed
//! unit of work with a unique id and an optional parent. The types here
//! cover the in-process half of that model (creating, nesting and
//! finishing spans) while [`crate::propagation`] covers the cross-process
//! half.

mod export;
mod id_generator;
mod in_memory_exporter;
mod span;
mod span_context;
mod stdout;
mod tracer;

pub use export::{
    BatchConfig, BatchSpanProcessor, BatchSpanProcessorBuilder, ExportResult, SimpleSpanProcessor,
    SpanData, SpanExporter, SpanProcessor,
};
pub use id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use span::{Event, Span, SpanKind, Status};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId};
pub use stdout::StdoutSpanExporter;
pub use tracer::{SpanBuilder, Tracer, TracerBuilder};
