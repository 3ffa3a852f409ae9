//! Blocking HTTP client authorizing API requests with tokens from a
//! [`TokenProvider`].
use std::sync::Arc;

use http::{header::AUTHORIZATION, StatusCode};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    IntoUrl, Method,
};

use crate::{error::Result, TokenProvider};

/// Sends API requests with the `Authorization` header of the provider's current
/// token.
///
/// When the API answers `401 Unauthorized` to a request authorized here, the token
/// is invalidated so that the next request uses a freshly issued one. The request
/// itself is not retried; the `401` response is returned to the caller.
#[derive(Debug, Clone)]
pub struct HttpClient<P> {
    provider: P,
    client: Client,
}

impl<P: TokenProvider> HttpClient<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_client(provider, Client::new())
    }

    #[must_use]
    pub fn with_client(provider: P, client: Client) -> Self {
        Self { provider, client }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start building a request. Authorization is added by [`Self::send`].
    #[must_use]
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    #[must_use]
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    #[must_use]
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Send `request`, authorized with the current token unless it already carries
    /// an `Authorization` header.
    ///
    /// # Errors
    /// - Fails if the request cannot be built.
    /// - Fails if no token can be obtained.
    /// - Fails if the request cannot be sent. Error statuses are not errors.
    pub fn send(&self, request: RequestBuilder) -> Result<Response> {
        let mut request = request.build().map_err(Arc::new)?;

        let authorize = !request.headers().contains_key(AUTHORIZATION);
        if authorize {
            let header = self.provider.authorization_header()?;
            request.headers_mut().insert(AUTHORIZATION, header);
        }

        let response = self.client.execute(request).map_err(Arc::new)?;
        if authorize && response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(
                "API rejected the token of client `{}`. Invalidating it.",
                self.provider.client_id()
            );
            self.provider.invalidate_token();
        }
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeDelta, Utc};
    use mockito::Matcher;

    use super::*;
    use crate::{
        AccessToken, AuthConfig, AuthenticationError, AuthenticationErrorKind, Backend, Error,
        TokenCache,
    };

    #[derive(Debug)]
    struct FixedToken {
        value: Option<&'static str>,
        invalidated: AtomicUsize,
    }

    impl FixedToken {
        fn new(value: Option<&'static str>) -> Self {
            Self {
                value,
                invalidated: AtomicUsize::new(0),
            }
        }

        fn invalidated(&self) -> usize {
            self.invalidated.load(Ordering::SeqCst)
        }
    }

    impl TokenProvider for FixedToken {
        fn client_id(&self) -> &str {
            "api-client"
        }

        fn get_token(&self) -> std::result::Result<AccessToken, AuthenticationError> {
            self.value
                .map(|value| AccessToken::new(value, "Bearer", Utc::now() + TimeDelta::hours(1)))
                .ok_or_else(|| {
                    AuthenticationError::new(AuthenticationErrorKind::UnexpectedStatus(401))
                })
        }

        fn invalidate_token(&self) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_adds_bearer_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/data")
            .match_header("authorization", "Bearer api-token")
            .with_status(200)
            .create();

        let client = HttpClient::new(FixedToken::new(Some("api-token")));
        let response = client
            .send(client.get(format!("{}/data", server.url())))
            .unwrap();

        mock.assert();
        assert!(response.status().is_success());
        assert_eq!(client.provider().invalidated(), 0);
    }

    #[test]
    fn test_keeps_existing_authorization() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/data")
            .match_header("authorization", "Bearer existing-token")
            .with_status(401)
            .create();

        // a provider without token fails the test if it is consulted
        let client = HttpClient::new(FixedToken::new(None));
        let request = client
            .post(format!("{}/data", server.url()))
            .header(AUTHORIZATION, "Bearer existing-token");

        let response = client.send(request).unwrap();
        mock.assert();
        assert_eq!(response.status(), 401);
        assert_eq!(client.provider().invalidated(), 0);
    }

    #[test]
    fn test_rejected_token_is_invalidated_without_retry() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/data")
            .with_status(401)
            .expect(1)
            .create();

        let client = HttpClient::new(FixedToken::new(Some("api-token")));
        let response = client
            .send(client.get(format!("{}/data", server.url())))
            .unwrap();

        mock.assert();
        assert_eq!(response.status(), 401);
        assert_eq!(client.provider().invalidated(), 1);
    }

    #[test]
    fn test_forbidden_keeps_token() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/data").with_status(403).create();

        let client = HttpClient::new(FixedToken::new(Some("api-token")));
        let response = client
            .send(client.get(format!("{}/data", server.url())))
            .unwrap();

        assert_eq!(response.status(), 403);
        assert_eq!(client.provider().invalidated(), 0);
    }

    #[test]
    fn test_next_request_uses_new_token_after_rejection() {
        let mut server = mockito::Server::new();
        let token_endpoint = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"issued","token_type":"Bearer","expires_in":3600}"#)
            .expect(2)
            .create();
        let api = server
            .mock("GET", "/data")
            .match_header("authorization", Matcher::Exact("Bearer issued".to_string()))
            .with_status(401)
            .expect(2)
            .create();

        let provider = AuthConfig::builder()
            .client_id("api-client")
            .client_secret("api-secret")
            .backend(Backend::local(&format!("{}/token", server.url())).unwrap())
            .cache(TokenCache::new())
            .build()
            .token_provider()
            .unwrap();
        let client = HttpClient::new(provider);
        let url = format!("{}/data", server.url());

        client.send(client.get(&url)).unwrap();
        client.send(client.get(&url)).unwrap();

        token_endpoint.assert();
        api.assert();
    }

    #[test]
    fn test_token_failure_is_reported() {
        let client = HttpClient::new(FixedToken::new(None));
        let err = client
            .send(client.get("http://127.0.0.1:9/data"))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Authentication(e) if e.kind() == AuthenticationErrorKind::UnexpectedStatus(401)
        ));
    }
}
