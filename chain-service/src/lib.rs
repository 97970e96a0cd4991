//! One link of a trace-propagation chain.
//!
//! The service accepts `GET {route}` requests, continues the trace carried
//! in the `traceparent` header (or starts a new one), optionally performs
//! simulated local work, forwards the context to the next configured link
//! and reports its spans to the exporter sink. See [`ChainHandler`] for
//! the per-request state machine.

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, warn};

pub mod config;
mod error;
pub mod handler;

pub use config::ChainConfig;
pub use error::ChainError;
pub use handler::ChainHandler;

/// Serves the chain handler on an already-bound listener.
///
/// Each accepted connection runs on its own task, so a link can call a
/// downstream link (including itself through the loopback) without
/// stalling the accept loop. Runs until the caller drops the future.
pub async fn serve(listener: TcpListener, handler: Arc<ChainHandler>) -> Result<(), ChainError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = Arc::clone(&handler);
                async move { Ok::<_, Infallible>(handler.handle(req).await) }
            });
            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(error = %err, %peer, "connection error");
            }
        });
    }
}
