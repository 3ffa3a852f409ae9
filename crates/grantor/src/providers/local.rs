use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header::AUTHORIZATION, HeaderValue};
use oauth2::{ClientSecret, TokenUrl};

use super::{
    request::{self, GRANT_TYPE},
    Exchange, TokenProvider,
};
use crate::{
    error::{AuthenticationError, AuthenticationErrorKind},
    token::AccessToken,
    transport::HttpRequest,
};

/// Client-credentials grant against a local token endpoint.
///
/// The client authenticates with HTTP Basic auth; the JSON body only names the
/// grant type.
#[derive(Debug)]
pub struct LocalBasicAuthProvider {
    exchange: Exchange,
    client_secret: ClientSecret,
    token_url: TokenUrl,
}

impl LocalBasicAuthProvider {
    pub(crate) fn new(
        exchange: Exchange,
        client_secret: ClientSecret,
        token_url: TokenUrl,
    ) -> Self {
        Self {
            exchange,
            client_secret,
            token_url,
        }
    }

    /// Built per request so the encoded credentials are not kept around.
    fn basic_auth(&self) -> Result<HeaderValue, AuthenticationError> {
        let credentials = format!("{}:{}", self.exchange.client_id(), self.client_secret.secret());
        let mut header = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials)))
            .map_err(|_| AuthenticationError::new(AuthenticationErrorKind::RequestEncoding))?;
        header.set_sensitive(true);
        Ok(header)
    }

    fn request(&self) -> Result<HttpRequest, AuthenticationError> {
        let authorization = self.basic_auth()?;
        request::json(
            &self.token_url,
            &serde_json::json!({ "grant_type": GRANT_TYPE }),
            |b| b.header(AUTHORIZATION, authorization),
        )
    }
}

impl TokenProvider for LocalBasicAuthProvider {
    fn client_id(&self) -> &str {
        self.exchange.client_id()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(client_id = self.client_id()))]
    fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        self.exchange.token(|| self.request())
    }

    fn invalidate_token(&self) {
        self.exchange.invalidate();
    }
}
