use crate::{HttpClient, HttpError, ResponseExt};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{
    connect::{Connect, HttpConnector},
    Client,
};
use std::time::Duration;
use tokio::time;

/// [`HttpClient`] implementation backed by the hyper legacy client.
///
/// An optional timeout bounds each request; without one the call waits as
/// long as the transport does, which is the documented default for the
/// chain's downstream hop.
#[derive(Debug, Clone)]
pub struct HyperClient<C = HttpConnector>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    inner: Client<C, Full<Bytes>>,
    timeout: Option<Duration>,
}

impl<C> HyperClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a client over the given connector.
    pub fn new(connector: C, timeout: Option<Duration>) -> Self {
        let inner = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);
        Self { inner, timeout }
    }
}

impl HyperClient<HttpConnector> {
    /// Creates a new `HyperClient` with a default `HttpConnector`.
    pub fn with_default_connector(timeout: Option<Duration>) -> Self {
        Self::new(HttpConnector::new(), timeout)
    }
}

#[async_trait]
impl<C> HttpClient for HyperClient<C>
where
    C: Connect + Clone + Send + Sync + 'static + std::fmt::Debug,
{
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let request = request.map(Full::new);
        let response_future = self.inner.request(request);
        let mut response = match self.timeout {
            Some(timeout) => time::timeout(timeout, response_future).await??,
            None => response_future.await?,
        };
        let headers = std::mem::take(response.headers_mut());

        let mut http_response = Response::builder()
            .status(response.status())
            .body(response.into_body().collect().await?.to_bytes())?;
        *http_response.headers_mut() = headers;

        http_response.error_for_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_target_is_an_error() {
        // Port 1 on localhost is essentially guaranteed closed.
        let client = HyperClient::with_default_connector(Some(Duration::from_secs(2)));
        let request = Request::builder()
            .uri("http://127.0.0.1:1/nothing")
            .body(Bytes::new())
            .unwrap();

        assert!(client.send(request).await.is_err());
    }
}
