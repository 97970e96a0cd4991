//! Single operation within a trace.
//!
//! Spans are open from [`Tracer::start`] until [`Span::end`]. While open
//! they are owned exclusively by the call frame that opened them and may
//! accumulate attributes and events; once ended they are immutable and the
//! finished record has been handed to the span processor.
//!
//! Child span lifetimes are expected to nest within their parent's open
//! interval. This is not enforced at runtime, spans being independent
//! records, so a violation only becomes visible in trace visualization.
//!
//! [`Tracer::start`]: crate::trace::Tracer::start

use crate::trace::export::{SpanData, SpanProcessor};
use crate::trace::SpanContext;
use crate::{KeyValue, SpanId, TraceError, TraceResult};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

/// The relationship of the span to the request flow it describes.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Hash, Default)]
pub enum SpanKind {
    /// The span covers server-side handling of a request.
    Server,
    /// The span brackets an outbound call to another service.
    Client,
    /// The span covers an internal operation.
    #[default]
    Internal,
}

/// The status of a finished span.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The exact time the event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// Mutable state of a span that has not ended yet.
#[derive(Debug)]
struct ActiveData {
    parent_span_id: Option<SpanId>,
    span_kind: SpanKind,
    name: Cow<'static, str>,
    start_time: SystemTime,
    attributes: Vec<KeyValue>,
    events: Vec<Event>,
    status: Status,
}

/// A single timed unit of work within a trace.
///
/// Ending the span hands the finished [`SpanData`] record to the processor
/// it was created with. Dropping a still-open span ends it implicitly, so
/// every exit path of the owning frame, including cancellation, closes
/// the span exactly once. An implicit close records an error status
/// (unless the owner already set one), since the normal path ends
/// explicitly after setting the outcome.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<ActiveData>,
    processor: Arc<dyn SpanProcessor>,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        parent_span_id: Option<SpanId>,
        span_kind: SpanKind,
        name: Cow<'static, str>,
        attributes: Vec<KeyValue>,
        processor: Arc<dyn SpanProcessor>,
    ) -> Self {
        Span {
            span_context,
            data: Some(ActiveData {
                parent_span_id,
                span_kind,
                name,
                start_time: SystemTime::now(),
                attributes,
                events: Vec::new(),
                status: Status::Unset,
            }),
            processor,
        }
    }

    /// Returns the `SpanContext` for this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The span id of this span's parent, if it has one.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.data.as_ref().and_then(|data| data.parent_span_id)
    }

    /// Returns `true` if this span is still open and recording.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    fn with_data<T>(&mut self, f: impl FnOnce(&mut ActiveData) -> T) -> TraceResult<T> {
        self.data
            .as_mut()
            .map(f)
            .ok_or(TraceError::SpanAlreadyEnded)
    }

    /// Sets a single attribute, replacing any previous value for the key.
    ///
    /// Returns an error if the span has already ended; mutating a closed
    /// span indicates a lifecycle bug in the caller.
    pub fn set_attribute(&mut self, attribute: KeyValue) -> TraceResult<()> {
        self.with_data(|data| {
            match data.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => data.attributes.push(attribute),
            }
        })
    }

    /// Records an event at the current time.
    pub fn add_event(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        attributes: Vec<KeyValue>,
    ) -> TraceResult<()> {
        let event = Event::new(name, SystemTime::now(), attributes);
        self.with_data(|data| data.events.push(event))
    }

    /// Sets the status of this span.
    pub fn set_status(&mut self, status: Status) -> TraceResult<()> {
        self.with_data(|data| data.status = status)
    }

    /// Ends the span, finalizing its end time and handing the finished
    /// record to the span processor.
    ///
    /// A second `end` returns [`TraceError::SpanAlreadyEnded`]; double
    /// closing indicates a lifecycle bug in the caller rather than a
    /// condition to paper over.
    pub fn end(&mut self) -> TraceResult<()> {
        self.end_with_timestamp(SystemTime::now())
    }

    /// Ends the span with an explicit end timestamp.
    pub fn end_with_timestamp(&mut self, end_time: SystemTime) -> TraceResult<()> {
        let data = self.data.take().ok_or(TraceError::SpanAlreadyEnded)?;
        self.processor.on_end(SpanData {
            span_context: self.span_context,
            parent_span_id: data.parent_span_id,
            span_kind: data.span_kind,
            name: data.name,
            start_time: data.start_time,
            end_time,
            attributes: data.attributes,
            events: data.events,
            status: data.status,
        });
        Ok(())
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.data.is_some() {
            let _ = self.with_data(|data| {
                if data.status == Status::Unset {
                    data.status = Status::error("span dropped before end");
                }
            });
            let _ = self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};

    fn test_tracer() -> (Tracer, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let tracer = Tracer::builder("test")
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        (tracer, exporter)
    }

    #[test]
    fn attributes_replace_on_duplicate_key() {
        let (tracer, exporter) = test_tracer();
        let mut span = tracer.start("work", None);
        span.set_attribute(KeyValue::new("hop", 1_i64)).unwrap();
        span.set_attribute(KeyValue::new("hop", 2_i64)).unwrap();
        span.end().unwrap();

        let spans = exporter.finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes.len(), 1);
        assert_eq!(spans[0].attributes[0], KeyValue::new("hop", 2_i64));
    }

    #[test]
    fn events_are_ordered() {
        let (tracer, exporter) = test_tracer();
        let mut span = tracer.start("work", None);
        span.add_event("first", vec![]).unwrap();
        span.add_event("second", vec![KeyValue::new("k", "v")])
            .unwrap();
        span.end().unwrap();

        let spans = exporter.finished_spans().unwrap();
        let names: Vec<_> = spans[0].events.iter().map(|e| e.name.as_ref()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn mutating_ended_span_is_an_error() {
        let (tracer, _exporter) = test_tracer();
        let mut span = tracer.start("work", None);
        span.end().unwrap();

        assert!(matches!(
            span.set_attribute(KeyValue::new("late", true)),
            Err(TraceError::SpanAlreadyEnded)
        ));
        assert!(matches!(
            span.add_event("late", vec![]),
            Err(TraceError::SpanAlreadyEnded)
        ));
        assert!(matches!(
            span.set_status(Status::Ok),
            Err(TraceError::SpanAlreadyEnded)
        ));
    }

    #[test]
    fn double_end_is_an_error() {
        let (tracer, exporter) = test_tracer();
        let mut span = tracer.start("work", None);
        assert!(span.end().is_ok());
        assert!(matches!(span.end(), Err(TraceError::SpanAlreadyEnded)));

        // The record was exported exactly once.
        assert_eq!(exporter.finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn drop_ends_open_span_once() {
        let (tracer, exporter) = test_tracer();
        {
            let _span = tracer.start("dropped", None);
        }
        assert_eq!(exporter.finished_spans().unwrap().len(), 1);

        exporter.reset();
        {
            let mut span = tracer.start("ended-then-dropped", None);
            span.end().unwrap();
        }
        assert_eq!(exporter.finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn implicit_close_records_an_error_status() {
        let (tracer, exporter) = test_tracer();
        {
            let _span = tracer.start("cancelled", None);
        }

        let spans = exporter.finished_spans().unwrap();
        assert!(matches!(spans[0].status, Status::Error { .. }));
    }

    #[test]
    fn implicit_close_keeps_an_explicit_status() {
        let (tracer, exporter) = test_tracer();
        {
            let mut span = tracer.start("settled-then-dropped", None);
            span.set_status(Status::Ok).unwrap();
        }

        let spans = exporter.finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::Ok);
    }
}
