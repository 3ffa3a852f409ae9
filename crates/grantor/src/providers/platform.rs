use oauth2::{ClientSecret, TokenUrl};

use super::{
    request::{self, GRANT_TYPE},
    Exchange, TokenProvider,
};
use crate::{
    config::BodyFormat, error::AuthenticationError, token::AccessToken, transport::HttpRequest,
};

/// Client-credentials grant against the platform token endpoint.
///
/// Client id and secret are sent in the body, encoded as configured by
/// [`BodyFormat`].
#[derive(Debug)]
pub struct PlatformProvider {
    exchange: Exchange,
    client_secret: ClientSecret,
    token_url: TokenUrl,
    body: BodyFormat,
}

impl PlatformProvider {
    pub(crate) fn new(
        exchange: Exchange,
        client_secret: ClientSecret,
        token_url: TokenUrl,
        body: BodyFormat,
    ) -> Self {
        Self {
            exchange,
            client_secret,
            token_url,
            body,
        }
    }

    fn request(&self) -> Result<HttpRequest, AuthenticationError> {
        let client_id = self.exchange.client_id();
        let client_secret = self.client_secret.secret().as_str();

        match self.body {
            BodyFormat::Form => request::form(
                &self.token_url,
                &[
                    ("grant_type", GRANT_TYPE),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ],
                |b| b,
            ),
            BodyFormat::Json => request::json(
                &self.token_url,
                &serde_json::json!({
                    "grant_type": GRANT_TYPE,
                    "client_id": client_id,
                    "client_secret": client_secret,
                }),
                |b| b,
            ),
        }
    }
}

impl TokenProvider for PlatformProvider {
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
