//! HTTP carrier adapters and a minimal async HTTP client.
//!
//! [`HeaderInjector`] and [`HeaderExtractor`] bridge the propagation
//! traits onto `http::HeaderMap` so a span context travels in request
//! headers, and [`HyperClient`] is the small client surface a chain link
//! uses for its one outbound hop.

use async_trait::async_trait;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};
use tracechain::propagation::{Extractor, Injector};

/// Helper for injecting the propagation headers into outbound HTTP
/// requests.
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap. Does nothing if the key or
    /// value are not valid inputs.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Helper for extracting the propagation headers from inbound HTTP
/// requests.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap. If the value is not valid
    /// ASCII, returns None.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|value| value.as_str())
            .collect::<Vec<_>>()
    }
}

/// Error type for HTTP client failures.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface necessary for issuing the chain's outbound call.
///
/// Abstracting the client keeps the chain handler testable and lets users
/// bring a client tied to their async runtime of choice.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with `Bytes` payload.
    ///
    /// Returns the response including status code and body, or an error if
    /// the server is unreachable, the request times out, or the response
    /// status is outside the 2xx range.
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

mod hyper_client;

pub use hyper_client::HyperClient;

/// Methods to make working with responses from the [`HttpClient`] trait
/// easier.
pub trait ResponseExt: Sized {
    /// Turn a response into an error if the HTTP status does not indicate
    /// success (200 - 299).
    fn error_for_status(self) -> Result<Self, HttpError>;
}

impl<T> ResponseExt for Response<T> {
    fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(format!("request failed with status {}", self.status()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracechain::propagation::TraceContextPropagator;
    use tracechain::trace::{SpanContext, TraceFlags};
    use tracechain::{SpanId, TraceId};

    #[test]
    fn http_headers_get() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName", "value".to_string());

        assert_eq!(
            HeaderExtractor(&carrier).get("HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        )
    }

    #[test]
    fn http_headers_keys() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName1", "value1".to_string());
        HeaderInjector(&mut carrier).set("headerName2", "value2".to_string());

        let extractor = HeaderExtractor(&carrier);
        let got = extractor.keys();
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }

    #[test]
    fn invalid_header_values_are_ignored() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("bad value", "with\nnewline".to_string());
        assert!(carrier.is_empty());
    }

    #[test]
    fn span_context_round_trips_through_header_map() {
        let propagator = TraceContextPropagator::new();
        let context = SpanContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
            SpanId::from(0x00f0_67aa_0ba9_02b7u64),
            TraceFlags::SAMPLED,
        );

        let mut carrier = http::HeaderMap::new();
        propagator.inject(&context, &mut HeaderInjector(&mut carrier));
        assert_eq!(
            propagator.extract(&HeaderExtractor(&carrier)),
            Some(context)
        );
    }

    #[test]
    fn error_for_status_rejects_non_2xx() {
        let ok = Response::builder().status(200).body(()).unwrap();
        assert!(ok.error_for_status().is_ok());

        let bad = Response::builder().status(502).body(()).unwrap();
        assert!(bad.error_for_status().is_err());
    }
}
