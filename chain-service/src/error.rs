use std::net::SocketAddr;
use thiserror::Error;
use tracechain::TraceError;

/// Errors that abort service startup or shutdown.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChainError {
    /// The listen socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address from the configuration.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// The trace pipeline failed to flush or shut down.
    #[error(transparent)]
    Trace(#[from] TraceError),
}
