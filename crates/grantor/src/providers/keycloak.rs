use oauth2::{ClientSecret, TokenUrl};

use super::{
    request::{self, GRANT_TYPE},
    Exchange, TokenProvider,
};
use crate::{error::AuthenticationError, token::AccessToken, transport::HttpRequest};

/// Client-credentials grant against a Keycloak realm.
///
/// Client id, secret and scope are sent in a form-encoded body.
#[derive(Debug)]
pub struct KeycloakProvider {
    exchange: Exchange,
    client_secret: ClientSecret,
    token_url: TokenUrl,
    scope: String,
}

impl KeycloakProvider {
    pub(crate) fn new(
        exchange: Exchange,
        client_secret: ClientSecret,
        token_url: TokenUrl,
        scope: String,
    ) -> Self {
        Self {
            exchange,
            client_secret,
            token_url,
            scope,
        }
    }

    fn request(&self) -> Result<HttpRequest, AuthenticationError> {
        request::form(
            &self.token_url,
            &[
                ("grant_type", GRANT_TYPE),
                ("client_id", self.exchange.client_id()),
                ("client_secret", self.client_secret.secret().as_str()),
                ("scope", self.scope.as_str()),
            ],
            |b| b,
        )
    }
}

impl TokenProvider for KeycloakProvider {
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
