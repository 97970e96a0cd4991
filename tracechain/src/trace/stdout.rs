use crate::trace::export::{ExportResult, SpanData, SpanExporter};
use crate::TraceError;
use futures_util::future::BoxFuture;
use std::io::{self, Write};

/// A span exporter that writes one line per finished span to stdout.
///
/// Intended as the default sink of a runnable chain link when no real
/// collector is wired up; the output is human-oriented and not a stable
/// format.
#[derive(Debug, Default)]
pub struct StdoutSpanExporter {
    _private: (),
}

impl StdoutSpanExporter {
    /// Create a new stdout exporter.
    pub fn new() -> Self {
        Self::default()
    }

    fn write_span(out: &mut impl Write, span: &SpanData) -> io::Result<()> {
        let duration = span
            .end_time
            .duration_since(span.start_time)
            .unwrap_or_default();
        write!(
            out,
            "span {name} trace_id={trace_id} span_id={span_id} parent={parent} kind={kind:?} duration={duration:?} status={status:?}",
            name = span.name,
            trace_id = span.span_context.trace_id(),
            span_id = span.span_context.span_id(),
            parent = span
                .parent_span_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string()),
            kind = span.span_kind,
            duration = duration,
            status = span.status,
        )?;
        for attribute in &span.attributes {
            write!(out, " {}={}", attribute.key, attribute.value)?;
        }
        for event in &span.events {
            write!(out, " event:{}", event.name)?;
        }
        writeln!(out)
    }
}

impl SpanExporter for StdoutSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = (|| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for span in &batch {
                Self::write_span(&mut out, span)?;
            }
            out.flush()
        })()
        .map_err(|err| TraceError::ExportFailed(err.to_string()));
        Box::pin(std::future::ready(result))
    }
}
