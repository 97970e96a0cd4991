use crate::trace::export::{ExportResult, SpanData, SpanExporter};
use crate::{TraceError, TraceResult};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// A span exporter that stores finished spans in memory.
///
/// Useful for tests and debugging: clones share the same storage, so a
/// test can keep one handle while the tracer owns the other and assert on
/// [`finished_spans`](InMemorySpanExporter::finished_spans) afterwards.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanExporter {
    /// Returns the finished spans recorded so far.
    pub fn finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(|_| TraceError::Internal("InMemorySpanExporter mutex poison".into()))
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.append(&mut batch))
            .map_err(|_| TraceError::ExportFailed("InMemorySpanExporter mutex poison".into()));
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.reset();
    }
}
