//! The chain request handler.
//!
//! One inbound request produces a small fixed span tree: a server span for
//! the request itself, optionally an internal span for simulated local
//! work, and a client span bracketing the call to the next link. The
//! context injected downstream is always the client span's, so the next
//! link's request span parents on the hop that actually called it.

use crate::config::ChainConfig;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracechain::propagation::TraceContextPropagator;
use tracechain::trace::{SpanContext, SpanKind, Status, Tracer};
use tracechain::KeyValue;
use tracechain_http::{HeaderExtractor, HeaderInjector, HttpClient, HttpError};
use tracing::{debug, warn};

/// Per-link request handler; shared across connection tasks.
#[derive(Debug)]
pub struct ChainHandler {
    tracer: Tracer,
    propagator: TraceContextPropagator,
    client: Arc<dyn HttpClient>,
    route: String,
    next_hop: Option<Uri>,
    work_delay: Duration,
}

impl ChainHandler {
    /// Wires a handler from the link configuration, a tracer and the
    /// client used for the downstream hop.
    pub fn new(config: &ChainConfig, tracer: Tracer, client: Arc<dyn HttpClient>) -> Self {
        ChainHandler {
            tracer,
            propagator: TraceContextPropagator::new(),
            client,
            route: config.route.clone(),
            next_hop: config.next_hop.clone(),
            work_delay: config.work_delay,
        }
    }

    /// Handles one inbound request.
    ///
    /// `GET {route}` runs the chain state machine; anything else is a 404.
    /// A failed downstream hop maps to a 502 response, never to a crash,
    /// and the request span is exported on every path.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET || req.uri().path() != self.route {
            let mut not_found = Response::new(Full::new(Bytes::new()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            return not_found;
        }

        let parent = self.propagator.extract(&HeaderExtractor(req.headers()));
        if parent.is_none() {
            debug!("no usable inbound trace context, starting a new trace");
        }

        let mut request_span = self
            .tracer
            .span_builder(self.tracer.service_name().to_string())
            .with_kind(SpanKind::Server)
            .with_parent(parent)
            .with_attributes(vec![KeyValue::new("http.route", self.route.clone())])
            .start(&self.tracer);
        let request_cx = *request_span.span_context();

        self.local_work(&request_cx).await;

        let outcome = match &self.next_hop {
            None => Ok(()),
            Some(next_hop) => self.call_next_hop(next_hop, &request_cx).await,
        };

        let trace_id = request_cx.trace_id().to_string();
        let response = match outcome {
            Ok(()) => {
                let _ = request_span.set_status(Status::Ok);
                json_response(
                    StatusCode::OK,
                    json!({
                        "service": self.tracer.service_name(),
                        "trace_id": trace_id,
                        "status": "ok",
                    }),
                )
            }
            Err(err) => {
                warn!(error = %err, "downstream hop failed");
                let _ = request_span.set_status(Status::error("downstream hop failed"));
                json_response(
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "service": self.tracer.service_name(),
                        "trace_id": trace_id,
                        "status": "error",
                        "reason": err.to_string(),
                    }),
                )
            }
        };

        // The request span closes last; Drop covers cancellation before
        // this point.
        let _ = request_span.end();
        response
    }

    /// Simulated local work as an internal child span, if configured.
    async fn local_work(&self, parent: &SpanContext) {
        if self.work_delay.is_zero() {
            return;
        }
        let mut span = self
            .tracer
            .span_builder("local-work")
            .with_kind(SpanKind::Internal)
            .with_parent(Some(*parent))
            .start(&self.tracer);
        tokio::time::sleep(self.work_delay).await;
        let _ = span.add_event("work complete", vec![]);
        let _ = span.end();
    }

    /// Calls the next link inside a client span and reports transport or
    /// status failures through the span status and the returned error.
    async fn call_next_hop(&self, next_hop: &Uri, parent: &SpanContext) -> Result<(), HttpError> {
        let mut span = self
            .tracer
            .span_builder(format!("GET {next_hop}"))
            .with_kind(SpanKind::Client)
            .with_parent(Some(*parent))
            .with_attributes(vec![KeyValue::new("http.url", next_hop.to_string())])
            .start(&self.tracer);

        let result = self.send_downstream(next_hop, span.span_context()).await;
        if let Err(err) = &result {
            let _ = span.set_status(Status::error(err.to_string()));
        }
        let _ = span.end();
        result
    }

    async fn send_downstream(
        &self,
        next_hop: &Uri,
        context: &SpanContext,
    ) -> Result<(), HttpError> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(next_hop.clone())
            .body(Bytes::new())?;
        self.propagator
            .inject(context, &mut HeaderInjector(request.headers_mut()));
        self.client.send(request).await.map(|_| ())
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
