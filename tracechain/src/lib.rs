//! Core types for a distributed trace-propagation chain.
//!
//! A chain is a fixed sequence of services each calling the next. Every
//! service extracts the inbound [`SpanContext`] from its request carrier,
//! opens a request [`Span`] parented on it, and re-injects the context of
//! the currently open span into the outbound call, so that one logical
//! request shows up as a single connected trace without any central
//! coordinator.
//!
//! The crate is split along those responsibilities:
//!
//! - [`trace`]: span context, tracer, span and the exporter-sink boundary.
//! - [`propagation`]: encoding a span context into and out of string
//!   key/value carriers.
//!
//! There is no global tracer or propagator: both are plain values threaded
//! through the request path, which keeps concurrent requests isolated by
//! construction.
//!
//! # Examples
//!
//! ```
//! use tracechain::propagation::{Extractor, TraceContextPropagator};
//! use tracechain::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};
//! use std::collections::HashMap;
//!
//! let exporter = InMemorySpanExporter::default();
//! let tracer = Tracer::builder("demo")
//!     .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
//!     .build();
//! let propagator = TraceContextPropagator::new();
//!
//! // Inbound carrier without a traceparent header: new root trace.
//! let carrier: HashMap<String, String> = HashMap::new();
//! let parent = propagator.extract(&carrier);
//! assert!(parent.is_none());
//!
//! let mut span = tracer.start("handle-request", parent.as_ref());
//!
//! // Forward the *current* span's context to the next hop.
//! let mut outbound = HashMap::new();
//! propagator.inject(span.span_context(), &mut outbound);
//! assert!(outbound.get("traceparent").is_some());
//!
//! span.end().unwrap();
//! assert_eq!(exporter.finished_spans().unwrap().len(), 1);
//! ```

pub mod propagation;
pub mod trace;

mod common;
mod error;

pub use common::{Key, KeyValue, Value};
pub use error::{TraceError, TraceResult};

#[doc(inline)]
pub use trace::{SpanContext, SpanId, TraceFlags, TraceId};
