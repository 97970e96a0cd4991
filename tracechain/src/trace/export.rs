//! The exporter-sink boundary.
//!
//! Finished spans leave the core through a [`SpanProcessor`], which in turn
//! feeds a [`SpanExporter`]. Processors must accept concurrent `on_end`
//! calls from arbitrarily many in-flight requests and must not block the
//! caller indefinitely; export is best-effort relative to request success.

use crate::trace::span::{Event, SpanKind, Status};
use crate::trace::SpanContext;
use crate::{KeyValue, SpanId, TraceError, TraceResult};
use futures_executor::block_on;
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use std::{env, str::FromStr, thread};

/// Describes the result of an export.
pub type ExportResult = TraceResult<()>;

/// `SpanData` contains all the information collected by a span and is the
/// record handed to exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, unset for a trace root
    pub parent_span_id: Option<SpanId>,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
    /// Span events
    pub events: Vec<Event>,
    /// Span status
    pub status: Status,
}

/// Interface that span transmitters must implement so they can be plugged
/// in as the sink of a chain link.
///
/// The exporter is expected to be a simple encoder and transmitter of span
/// batches. It will never be called concurrently for the same instance and
/// must not block indefinitely.
pub trait SpanExporter: Send + Sync + Debug {
    /// Exports a batch of finished spans.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Shuts down the exporter. Called once; subsequent exports are not
    /// allowed.
    fn shutdown(&mut self) {}
}

/// Hooks invoked when spans finish.
///
/// `on_end` is called synchronously within `Span::end`, from the execution
/// handling the request that owned the span, so implementations must be
/// thread safe and cheap.
pub trait SpanProcessor: Send + Sync + Debug {
    /// Called after a span has ended with its finished record.
    fn on_end(&self, span: SpanData);
    /// Export any spans held in buffers.
    fn force_flush(&self) -> TraceResult<()>;
    /// Shut down the processor, flushing remaining spans.
    fn shutdown(&self) -> TraceResult<()>;
}

/// A [`SpanProcessor`] that passes finished spans to the exporter as soon
/// as they end, without batching. Useful for tests and debugging; use
/// [`BatchSpanProcessor`] for anything throughput-sensitive.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
}

impl SimpleSpanProcessor {
    /// Create a new [`SimpleSpanProcessor`] using the provided exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        Self {
            exporter: Mutex::new(exporter),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Internal("SimpleSpanProcessor mutex poison".into()))
            .and_then(|mut exporter| block_on(exporter.export(vec![span])));

        if let Err(err) = result {
            tracing::debug!(error = %err, "simple span processor export failed");
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        let mut exporter = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Internal("SimpleSpanProcessor mutex poison".into()))?;
        exporter.shutdown();
        Ok(())
    }
}

/// Delay interval between two consecutive exports.
const CHAIN_BSP_SCHEDULE_DELAY: &str = "CHAIN_BSP_SCHEDULE_DELAY";
const CHAIN_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum queue size before spans are dropped.
const CHAIN_BSP_MAX_QUEUE_SIZE: &str = "CHAIN_BSP_MAX_QUEUE_SIZE";
const CHAIN_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be no greater than the queue size.
const CHAIN_BSP_MAX_EXPORT_BATCH_SIZE: &str = "CHAIN_BSP_MAX_EXPORT_BATCH_SIZE";
const CHAIN_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Batching configuration for [`BatchSpanProcessor`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of queued spans before new ones are dropped.
    pub max_queue_size: usize,
    /// Delay between two consecutive scheduled exports.
    pub scheduled_delay: Duration,
    /// Maximum number of spans shipped in one export call.
    pub max_export_batch_size: usize,
}

impl Default for BatchConfig {
    /// Defaults, overridable via the `CHAIN_BSP_*` environment variables.
    fn default() -> Self {
        let max_queue_size = env_or(CHAIN_BSP_MAX_QUEUE_SIZE, CHAIN_BSP_MAX_QUEUE_SIZE_DEFAULT);
        BatchConfig {
            max_queue_size,
            scheduled_delay: Duration::from_millis(env_or(
                CHAIN_BSP_SCHEDULE_DELAY,
                CHAIN_BSP_SCHEDULE_DELAY_DEFAULT,
            )),
            max_export_batch_size: env_or(
                CHAIN_BSP_MAX_EXPORT_BATCH_SIZE,
                CHAIN_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            )
            .min(max_queue_size),
        }
    }
}

/// Messages exchanged between the request threads and the export thread.
#[derive(Debug)]
enum BatchMessage {
    ExportSpan(Box<SpanData>),
    ForceFlush(SyncSender<TraceResult<()>>),
    Shutdown(SyncSender<TraceResult<()>>),
}

/// A [`SpanProcessor`] with a dedicated background thread that batches
/// finished spans before export.
///
/// `on_end` never blocks: spans are handed over with a non-blocking send
/// and dropped (counted, warned once) when the queue is full.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_span_count: Arc<AtomicUsize>,
}

impl BatchSpanProcessor {
    /// Creates a new `BatchSpanProcessor` with the given exporter and
    /// configuration.
    pub fn new<E>(mut exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (message_sender, message_receiver) = sync_channel(config.max_queue_size);

        let handle = thread::Builder::new()
            .name("tracechain-batch-exporter".to_string())
            .spawn(move || {
                let mut spans = Vec::with_capacity(config.max_export_batch_size);
                let mut last_export_time = Instant::now();

                loop {
                    let timeout = config
                        .scheduled_delay
                        .saturating_sub(last_export_time.elapsed());
                    match message_receiver.recv_timeout(timeout) {
                        Ok(BatchMessage::ExportSpan(span)) => {
                            spans.push(*span);
                            if spans.len() >= config.max_export_batch_size
                                || last_export_time.elapsed() >= config.scheduled_delay
                            {
                                if let Err(err) = block_on(exporter.export(spans.split_off(0))) {
                                    tracing::warn!(error = %err, "batch export failed");
                                }
                                last_export_time = Instant::now();
                            }
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = block_on(exporter.export(spans.split_off(0)));
                            let _ = sender.send(result);
                            last_export_time = Instant::now();
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            let result = block_on(exporter.export(spans.split_off(0)));
                            exporter.shutdown();
                            let _ = sender.send(result);
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if !spans.is_empty()
                                && last_export_time.elapsed() >= config.scheduled_delay
                            {
                                if let Err(err) = block_on(exporter.export(spans.split_off(0))) {
                                    tracing::warn!(error = %err, "batch export failed");
                                }
                            }
                            last_export_time = Instant::now();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            tracing::debug!("batch channel disconnected, stopping export thread");
                            break;
                        }
                    }
                }
            })
            .map_err(|err| TraceError::Internal(format!("failed to spawn export thread: {err}")));

        // A failed spawn leaves the processor permanently dropping spans;
        // surfaced through the drop counter and the warning below.
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "batch span processor is inoperative");
                None
            }
        };

        Self {
            message_sender,
            handle: Mutex::new(handle),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            is_shutdown: AtomicBool::new(false),
            dropped_span_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a builder with the default batching configuration.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() || self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        let result = self
            .message_sender
            .try_send(BatchMessage::ExportSpan(Box::new(span)));

        if result.is_err() {
            // Warn only on the first drop to avoid flooding.
            if self.dropped_span_count.fetch_add(1, Ordering::Relaxed) == 0 {
                tracing::warn!(
                    "batch span processor dropped a span (queue full); further drops are counted silently"
                );
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|_| TraceError::Internal("failed to send flush message".into()))?;

        receiver
            .recv_timeout(self.forceflush_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.forceflush_timeout))?
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let dropped = self.dropped_span_count.load(Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!(count = dropped, "spans were dropped before shutdown");
        }

        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::Shutdown(sender))
            .map_err(|_| TraceError::Internal("failed to send shutdown message".into()))?;

        let result = receiver
            .recv_timeout(self.shutdown_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.shutdown_timeout))?;

        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                handle
                    .join()
                    .map_err(|_| TraceError::Internal("export thread panicked".into()))?;
            }
        }
        result
    }
}

/// Builder for [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the maximum queue size.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self.config.max_export_batch_size = self.config.max_export_batch_size.min(size);
        self
    }

    /// Set the delay between scheduled exports.
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.config.scheduled_delay = delay;
        self
    }

    /// Set the maximum export batch size.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.config.max_export_batch_size = size.min(self.config.max_queue_size);
        self
    }

    /// Build the processor, spawning its export thread.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, Tracer};

    #[test]
    fn batch_config_env_overrides() {
        temp_env::with_vars(
            [
                (CHAIN_BSP_MAX_QUEUE_SIZE, Some("10")),
                (CHAIN_BSP_SCHEDULE_DELAY, Some("250")),
                (CHAIN_BSP_MAX_EXPORT_BATCH_SIZE, Some("500")),
            ],
            || {
                let config = BatchConfig::default();
                assert_eq!(config.max_queue_size, 10);
                assert_eq!(config.scheduled_delay, Duration::from_millis(250));
                // Batch size is clamped to the queue size.
                assert_eq!(config.max_export_batch_size, 10);
            },
        );
    }

    #[test]
    fn batch_config_ignores_garbage() {
        temp_env::with_var(CHAIN_BSP_MAX_QUEUE_SIZE, Some("not-a-number"), || {
            let config = BatchConfig::default();
            assert_eq!(config.max_queue_size, CHAIN_BSP_MAX_QUEUE_SIZE_DEFAULT);
        });
    }

    #[test]
    fn batch_processor_flush_and_shutdown() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let tracer = Tracer::builder("batch-test")
            .with_span_processor(processor)
            .build();

        for _ in 0..3 {
            let mut span = tracer.start("op", None);
            span.end().unwrap();
        }

        tracer.force_flush().unwrap();
        assert_eq!(exporter.finished_spans().unwrap().len(), 3);

        tracer.shutdown().unwrap();
        assert!(matches!(
            tracer.shutdown(),
            Err(TraceError::AlreadyShutdown)
        ));
    }

    #[test]
    fn unsampled_spans_are_skipped() {
        use crate::trace::{SpanContext, TraceFlags};
        use crate::{SpanId, TraceId};

        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(Box::new(exporter.clone()));
        processor.on_end(SpanData {
            span_context: SpanContext::new(
                TraceId::from(1u128),
                SpanId::from(2u64),
                TraceFlags::NOT_SAMPLED,
            ),
            parent_span_id: None,
            span_kind: SpanKind::Internal,
            name: "unsampled".into(),
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            attributes: vec![],
            events: vec![],
            status: Status::Unset,
        });
        assert!(exporter.finished_spans().unwrap().is_empty());
    }
}
