//! The HTTP seam used to reach token endpoints.
//!
//! Token providers only need a synchronous `POST` with custom headers and a raw
//! body. [`ReqwestTransportFactory`] is the default; tests and embedding
//! applications can supply their own [`HttpTransport`].
use std::{sync::Arc, time::Duration};

pub type HttpRequest = http::Request<Vec<u8>>;
pub type HttpResponse = http::Response<Vec<u8>>;
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Executes a single HTTP exchange.
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns the response, whatever its status.
    ///
    /// # Errors
    /// Fails if no response could be obtained (connection, TLS, timeout, ...).
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Creates the [`HttpTransport`] a token provider uses.
pub trait TransportFactory: Send + Sync {
    /// # Errors
    /// Fails if the transport cannot be initialized.
    fn create(&self) -> Result<Arc<dyn HttpTransport>, TransportError>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Result<Arc<dyn HttpTransport>, TransportError> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn HttpTransport>, TransportError> {
        self()
    }
}

/// Factory for [`ReqwestTransport`].
///
/// Redirects are disabled to prevent credentials from being forwarded to
/// another host. An optional timeout applies to the whole exchange.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransportFactory {
    timeout: Option<Duration>,
}

impl ReqwestTransportFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl TransportFactory for ReqwestTransportFactory {
    fn create(&self) -> Result<Arc<dyn HttpTransport>, TransportError> {
        let mut builder =
            reqwest::blocking::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Arc::new(ReqwestTransport {
            client: builder.build()?,
        }))
    }
}

/// [`HttpTransport`] backed by a blocking `reqwest` client.
///
/// Must not be used from within an async runtime.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client. Make sure its redirect policy is `Policy::none()`.
    #[must_use]
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let request = reqwest::blocking::Request::try_from(request)?;
        let response = self.client.execute(request)?;

        let mut builder = http::Response::builder().status(response.status());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(
                response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        let body = response.bytes()?.to_vec();
        Ok(builder.body(body)?)
    }
}
