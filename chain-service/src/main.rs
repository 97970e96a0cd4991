use chain_service::{serve, ChainConfig, ChainError, ChainHandler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracechain::trace::{BatchSpanProcessor, StdoutSpanExporter, Tracer};
use tracechain_http::HyperClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ChainError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ChainConfig::from_env();
    info!(
        service = %config.service_name,
        addr = %config.listen_addr,
        route = %config.route,
        next_hop = %config
            .next_hop
            .as_ref()
            .map(|uri| uri.to_string())
            .unwrap_or_else(|| "none".to_string()),
        "starting chain link"
    );

    let processor = BatchSpanProcessor::builder(StdoutSpanExporter::new()).build();
    let tracer = Tracer::builder(config.service_name.clone())
        .with_span_processor(processor)
        .build();
    let client = Arc::new(HyperClient::with_default_connector(
        config.downstream_timeout,
    ));
    let handler = Arc::new(ChainHandler::new(&config, tracer.clone(), client));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| ChainError::Bind {
            addr: config.listen_addr,
            source,
        })?;

    tokio::select! {
        result = serve(listener, handler) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    tracer.shutdown()?;
    Ok(())
}
