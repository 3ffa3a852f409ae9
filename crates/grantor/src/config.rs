use std::{fmt, path::PathBuf, sync::Arc};

use oauth2::{ClientId, ClientSecret, TokenUrl};
use typed_builder::TypedBuilder;

use crate::{
    cache::TokenCache,
    error::{AuthenticationError, AuthenticationErrorKind, Error, Result},
    providers::{
        Exchange, KeycloakProvider, LocalBasicAuthProvider, PlatformProvider, TokenProvider,
    },
    transport::{ReqwestTransportFactory, TransportFactory},
};

/// Scope requested from Keycloak when none are configured.
pub const DEFAULT_KEYCLOAK_SCOPE: &str = "email profile roles web-origins";

/// Body encoding of a platform token request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyFormat {
    /// `application/x-www-form-urlencoded`
    #[default]
    Form,
    /// `application/json`
    Json,
}

/// The identity backend that issues tokens, with its resolved token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// A Keycloak realm. Credentials and scope are sent in a form-encoded body.
    Keycloak { token_url: TokenUrl, scope: String },
    /// A local token endpoint authenticating the client with HTTP Basic auth.
    Local { token_url: TokenUrl },
    /// The platform token endpoint. Credentials are sent in the body.
    Platform { token_url: TokenUrl, body: BodyFormat },
}

impl Backend {
    /// Keycloak realm `realm` served at `host`.
    ///
    /// Scopes are joined with a single space in the given order. If `scopes` is
    /// empty, [`DEFAULT_KEYCLOAK_SCOPE`] is requested.
    ///
    /// # Errors
    /// Fails if `host` or `realm` is empty or the resulting URL is invalid.
    pub fn keycloak<S: AsRef<str>>(host: &str, realm: &str, scopes: &[S]) -> Result<Self> {
        if realm.is_empty() || realm.contains('/') {
            return Err(Error::InvalidConfig(format!("Invalid Keycloak realm `{realm}`")));
        }
        let host = normalize_host(host)?;
        let token_url = parse_token_url(format!(
            "{host}/auth/realms/{realm}/protocol/openid-connect/token"
        ))?;

        let scope = if scopes.is_empty() {
            DEFAULT_KEYCLOAK_SCOPE.to_string()
        } else {
            scopes
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(" ")
        };

        Ok(Self::Keycloak { token_url, scope })
    }

    /// A local token endpoint at exactly `token_url`.
    ///
    /// # Errors
    /// Fails if `token_url` is not a valid URL.
    pub fn local(token_url: &str) -> Result<Self> {
        Ok(Self::Local {
            token_url: parse_token_url(token_url.to_string())?,
        })
    }

    /// The platform token endpoint `{auth_host}/oauth/token`.
    ///
    /// # Errors
    /// Fails if `auth_host` is empty or the resulting URL is invalid.
    pub fn platform(auth_host: &str, body: BodyFormat) -> Result<Self> {
        let auth_host = normalize_host(auth_host)?;
        Ok(Self::Platform {
            token_url: parse_token_url(format!("{auth_host}/oauth/token"))?,
            body,
        })
    }

    #[must_use]
    pub fn token_url(&self) -> &TokenUrl {
        match self {
            Self::Keycloak { token_url, .. }
            | Self::Local { token_url }
            | Self::Platform { token_url, .. } => token_url,
        }
    }
}

fn normalize_host(host: &str) -> Result<&str> {
    let host = host.trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::InvalidConfig("Host must not be empty".to_string()));
    }
    Ok(host)
}

fn parse_token_url(url: String) -> Result<TokenUrl> {
    TokenUrl::new(url.clone())
        .map_err(|e| Error::InvalidConfig(format!("Invalid token url `{url}`: {e}")))
}

fn default_transport() -> Arc<dyn TransportFactory> {
    Arc::new(ReqwestTransportFactory::default())
}

fn default_token_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("grantor")
}

/// Client credentials plus everything needed to obtain tokens for them.
///
/// ```no_run
/// use grantor::{AuthConfig, Backend, TokenProvider};
///
/// let config = AuthConfig::builder()
///     .client_id("my-client")
///     .client_secret("my-secret")
///     .backend(Backend::keycloak("https://idp.example.com", "demo", &["openid"])?)
///     .write_to_file(true)
///     .build();
///
/// let token = config.token_provider()?.get_token()?;
/// # Ok::<(), grantor::Error>(())
/// ```
///
/// The following settings are available:
/// * `write_to_file`: Persist tokens in `token_dir`. Default is `false`.
/// * `token_dir`: Directory for persisted tokens. Default is `grantor` in the user cache directory.
/// * `transport`: Factory for the HTTP transport. Default is [`ReqwestTransportFactory`].
/// * `cache`: Token cache to use. Defaults to the process-wide cache of the token
///   endpoint and persistence settings, see [`TokenCache::shared`]. An explicit
///   cache takes precedence over `write_to_file` and `token_dir`; share it only
///   between configs of the same token endpoint.
#[derive(Clone, TypedBuilder)]
pub struct AuthConfig {
    #[builder(setter(transform = |client_id: &str| ClientId::new(client_id.to_string())))]
    client_id: ClientId,
    #[builder(setter(
        transform = |client_secret: &str| ClientSecret::new(client_secret.to_string())
    ))]
    client_secret: ClientSecret,
    backend: Backend,
    #[builder(default)]
    write_to_file: bool,
    #[builder(default = default_token_dir(), setter(into))]
    token_dir: PathBuf,
    #[builder(default = default_transport())]
    transport: Arc<dyn TransportFactory>,
    #[builder(default, setter(strip_option))]
    cache: Option<TokenCache>,
}

impl AuthConfig {
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    #[must_use]
    pub fn token_url(&self) -> &TokenUrl {
        self.backend.token_url()
    }

    #[must_use]
    pub fn write_to_file(&self) -> bool {
        self.write_to_file
    }

    #[must_use]
    pub fn token_dir(&self) -> &std::path::Path {
        &self.token_dir
    }

    /// The cache tokens of this config are kept in.
    #[must_use]
    pub fn cache(&self) -> TokenCache {
        self.cache.clone().unwrap_or_else(|| {
            TokenCache::shared(
                self.token_url().as_str(),
                self.write_to_file.then_some(self.token_dir.as_path()),
            )
        })
    }

    /// Create the token provider for the configured backend.
    ///
    /// Providers created from the same config share its cache.
    ///
    /// # Errors
    /// Fails if the HTTP transport cannot be created.
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        let transport = self.transport.create().map_err(|e| {
            AuthenticationError::with_source(AuthenticationErrorKind::Transport, e)
        })?;
        let exchange = Exchange::new(self.client_id.clone(), self.cache(), transport);
        let client_secret = self.client_secret.clone();

        let provider: Arc<dyn TokenProvider> = match &self.backend {
            Backend::Keycloak { token_url, scope } => Arc::new(KeycloakProvider::new(
                exchange,
                client_secret,
                token_url.clone(),
                scope.clone(),
            )),
            Backend::Local { token_url } => Arc::new(LocalBasicAuthProvider::new(
                exchange,
                client_secret,
                token_url.clone(),
            )),
            Backend::Platform { token_url, body } => Arc::new(PlatformProvider::new(
                exchange,
                client_secret,
                token_url.clone(),
                *body,
            )),
        };
        Ok(provider)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("backend", &self.backend)
            .field("write_to_file", &self.write_to_file)
            .field("token_dir", &self.token_dir)
            .finish_non_exhaustive()
    }
}
