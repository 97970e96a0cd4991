use std::time::Duration;
use thiserror::Error;

/// A `Result` alias where the error case is [`TraceError`].
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing core.
///
/// Lifecycle variants indicate a contract violation in the code wiring
/// spans together and are reported rather than silently ignored. Export
/// variants never affect the request that produced the span.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The span has already been ended and is immutable.
    #[error("span has already ended")]
    SpanAlreadyEnded,

    /// The exporter rejected or failed to ship a batch of spans.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Export did not complete within the allowed time.
    #[error("export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// The processor was already shut down.
    #[error("span processor already shut down")]
    AlreadyShutdown,

    /// Any other internal failure.
    #[error("internal trace error: {0}")]
    Internal(String),
}
