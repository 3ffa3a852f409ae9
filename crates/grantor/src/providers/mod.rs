mod keycloak;
mod local;
mod platform;
mod request;
mod response;

use std::{
    fmt,
    sync::{Arc, PoisonError},
};

use chrono::Utc;
use http::HeaderValue;
pub use keycloak::*;
pub use local::*;
use oauth2::ClientId;
pub use platform::*;

use crate::{
    cache::TokenCache,
    error::{AuthenticationError, AuthenticationErrorKind, Error},
    token::AccessToken,
    transport::{HttpRequest, HttpTransport},
};

/// Main trait of this crate: hands out a currently valid token for one client.
pub trait TokenProvider: fmt::Debug + Send + Sync {
    /// The client id tokens are issued to.
    fn client_id(&self) -> &str;

    /// Returns the cached token if it is still valid, otherwise requests a new one
    /// from the token endpoint and caches it.
    ///
    /// Concurrent calls for the same client id wait for a single request instead of
    /// each sending their own. Failed requests are not retried.
    ///
    /// # Errors
    /// Fails if the backend rejects the request, the request cannot be sent, or the
    /// response lacks `access_token`, `token_type` or a numeric `expires_in`.
    fn get_token(&self) -> Result<AccessToken, AuthenticationError>;

    /// Forgets the cached token, e.g. after an API rejected it before its expiry.
    /// The next [`Self::get_token`] requests a new one.
    fn invalidate_token(&self);

    /// Returns the `Authorization` header for the current token, e.g. `Bearer abc`.
    ///
    /// # Errors
    /// - Fails if [`Self::get_token`] fails.
    /// - Fails if the token is not a valid header value.
    fn authorization_header(&self) -> Result<HeaderValue, Error> {
        let token = self.get_token()?;
        let mut header =
            HeaderValue::from_str(&token.header_value()).map_err(|_| Error::InvalidHeaderValue)?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl<P: TokenProvider + ?Sized> TokenProvider for Arc<P> {
    fn client_id(&self) -> &str {
        (**self).client_id()
    }

    fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        (**self).get_token()
    }

    fn invalidate_token(&self) {
        (**self).invalidate_token();
    }

    fn authorization_header(&self) -> Result<HeaderValue, Error> {
        (**self).authorization_header()
    }
}

/// The fetch protocol shared by all providers: cache lookup, request, response
/// parsing, cache store. Providers only contribute the request.
pub(crate) struct Exchange {
    client_id: ClientId,
    cache: TokenCache,
    transport: Arc<dyn HttpTransport>,
}

impl Exchange {
    pub(crate) fn new(
        client_id: ClientId,
        cache: TokenCache,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            client_id,
            cache,
            transport,
        }
    }

    pub(crate) fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    pub(crate) fn invalidate(&self) {
        if self.cache.invalidate(self.client_id()).is_some() {
            tracing::debug!("Invalidated cached token for client `{}`", self.client_id());
        }
    }

    pub(crate) fn token(
        &self,
        build_request: impl FnOnce() -> Result<HttpRequest, AuthenticationError>,
    ) -> Result<AccessToken, AuthenticationError> {
        let client_id = self.client_id();

        if let Some(token) = self.cache.lookup(client_id) {
            tracing::debug!("Using cached token for client `{client_id}`.");
            return Ok(token);
        }

        let fetch_lock = self.cache.fetch_lock(client_id);
        let _guard = fetch_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Whoever held the lock before us may have fetched a token already.
        if let Some(token) = self.cache.lookup(client_id) {
            tracing::debug!("Using token fetched concurrently for client `{client_id}`.");
            return Ok(token);
        }

        let token = self.fetch(build_request).inspect_err(|e| {
            tracing::error!("Failed to fetch token for client `{client_id}`: {e}");
        })?;
        self.cache.store(client_id, token.clone());
        Ok(token)
    }

    fn fetch(
        &self,
        build_request: impl FnOnce() -> Result<HttpRequest, AuthenticationError>,
    ) -> Result<AccessToken, AuthenticationError> {
        let request = build_request()?;
        tracing::debug!(
            "Requesting token for client `{}` from `{}`",
            self.client_id(),
            request.uri()
        );

        let response = self.transport.execute(request).map_err(|e| {
            AuthenticationError::with_source(AuthenticationErrorKind::Transport, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthenticationError::new(
                AuthenticationErrorKind::UnexpectedStatus(status.as_u16()),
            ));
        }

        let fields = response::parse_body(&response)?;
        let token = response::access_token(&fields, Utc::now())?;

        tracing::debug!(
            "Successfully fetched token for client `{}`, valid until {}",
            self.client_id(),
            token.expires_at()
        );
        Ok(token)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("client_id", &self.client_id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// In-process transports for tests.
#[cfg(test)]
pub(crate) mod stub {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use http::header::CONTENT_TYPE;

    use crate::transport::{
        HttpRequest, HttpResponse, HttpTransport, TransportError, TransportFactory,
    };

    /// Answers every request with the same response and records what it received.
    #[derive(Debug)]
    pub(crate) struct StubTransport {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
        delay: Duration,
        pub(crate) calls: AtomicUsize,
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub(crate) fn json(status: u16, body: &serde_json::Value) -> Arc<Self> {
            Self::raw(status, "application/json", body.to_string().into_bytes())
        }

        pub(crate) fn raw(status: u16, content_type: &'static str, body: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                status,
                content_type,
                body,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn delayed(mut self: Arc<Self>, delay: Duration) -> Arc<Self> {
            Arc::get_mut(&mut self).unwrap().delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpTransport for StubTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            std::thread::sleep(self.delay);
            Ok(http::Response::builder()
                .status(self.status)
                .header(CONTENT_TYPE, self.content_type)
                .body(self.body.clone())?)
        }
    }

    /// Hands out the same transport every time.
    #[derive(Clone)]
    pub(crate) struct StubFactory(pub(crate) Arc<dyn HttpTransport>);

    impl TransportFactory for StubFactory {
        fn create(&self) -> Result<Arc<dyn HttpTransport>, TransportError> {
            Ok(self.0.clone())
        }
    }

    /// Fails every request as if the endpoint was unreachable.
    #[derive(Debug)]
    pub(crate) struct Unreachable;

    impl HttpTransport for Unreachable {
        fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )
            .into())
        }
    }
}
