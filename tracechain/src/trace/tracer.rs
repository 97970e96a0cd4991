//! # Tracer
//!
//! The `Tracer` is the factory for [`Span`]s: it allocates ids, establishes
//! parent/child linkage and connects every span it creates to the span
//! processor handed in at build time. It is cheap to clone and is passed
//! explicitly through the request path; there is no process-global tracer.

use crate::trace::export::{SpanData, SpanProcessor};
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::span::{Span, SpanKind};
use crate::trace::{SpanContext, TraceFlags};
use crate::{KeyValue, TraceResult};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A processor that discards every span; the default until a real one is
/// configured.
#[derive(Debug)]
struct NoopSpanProcessor;

impl SpanProcessor for NoopSpanProcessor {
    fn on_end(&self, _span: SpanData) {}

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        Ok(())
    }
}

struct TracerInner {
    service_name: Cow<'static, str>,
    id_generator: Box<dyn IdGenerator>,
    processor: Arc<dyn SpanProcessor>,
}

/// `Tracer` implementation to create and manage spans.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.inner.service_name)
            .finish()
    }
}

impl Tracer {
    /// Start building a tracer for the given service.
    pub fn builder(service_name: impl Into<Cow<'static, str>>) -> TracerBuilder {
        TracerBuilder {
            service_name: service_name.into(),
            id_generator: Box::<RandomIdGenerator>::default(),
            processor: None,
        }
    }

    /// The service this tracer reports for.
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Starts a new [`Span`].
    ///
    /// With a parent, the new span joins the parent's trace and records the
    /// parent's span id; without one it becomes the root of a fresh trace.
    /// Root spans are always sampled; child spans inherit the parent's
    /// sampling decision so one flag governs a whole chain.
    pub fn start(&self, name: impl Into<Cow<'static, str>>, parent: Option<&SpanContext>) -> Span {
        self.span_builder(name).with_parent(parent.copied()).start(self)
    }

    /// Creates a [`SpanBuilder`] for a more configurable span start.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder {
            name: name.into(),
            span_kind: SpanKind::default(),
            parent: None,
            attributes: Vec::new(),
        }
    }

    fn build_span(&self, builder: SpanBuilder) -> Span {
        let span_id = self.inner.id_generator.new_span_id();
        let (trace_id, parent_span_id, trace_flags) = match builder.parent.filter(|p| p.is_valid())
        {
            Some(parent) => (
                parent.trace_id(),
                Some(parent.span_id()),
                parent.trace_flags() & TraceFlags::SAMPLED,
            ),
            None => (
                self.inner.id_generator.new_trace_id(),
                None,
                TraceFlags::SAMPLED,
            ),
        };

        Span::new(
            SpanContext::new(trace_id, span_id, trace_flags),
            parent_span_id,
            builder.span_kind,
            builder.name,
            builder.attributes,
            Arc::clone(&self.inner.processor),
        )
    }

    /// Export any spans held in processor buffers.
    pub fn force_flush(&self) -> TraceResult<()> {
        self.inner.processor.force_flush()
    }

    /// Shut down the span processor, flushing remaining spans.
    pub fn shutdown(&self) -> TraceResult<()> {
        self.inner.processor.shutdown()
    }
}

/// Builder for [`Tracer`].
pub struct TracerBuilder {
    service_name: Cow<'static, str>,
    id_generator: Box<dyn IdGenerator>,
    processor: Option<Arc<dyn SpanProcessor>>,
}

impl TracerBuilder {
    /// Use the given id generator instead of the random default.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Attach the span processor finished spans are handed to.
    pub fn with_span_processor(mut self, processor: impl SpanProcessor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Build the tracer. Without a processor, finished spans are discarded.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                service_name: self.service_name,
                id_generator: self.id_generator,
                processor: self
                    .processor
                    .unwrap_or_else(|| Arc::new(NoopSpanProcessor)),
            }),
        }
    }
}

/// Configuration for starting a span via [`Tracer::span_builder`].
#[derive(Clone, Debug)]
pub struct SpanBuilder {
    name: Cow<'static, str>,
    span_kind: SpanKind,
    parent: Option<SpanContext>,
    attributes: Vec<KeyValue>,
}

impl SpanBuilder {
    /// Specify the span kind.
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = span_kind;
        self
    }

    /// Parent the span on the given context, if any. An invalid context is
    /// treated as no parent.
    pub fn with_parent(mut self, parent: Option<SpanContext>) -> Self {
        self.parent = parent;
        self
    }

    /// Assign initial attributes.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Start the span.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build_span(self)
    }
}
