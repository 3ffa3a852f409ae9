use std::{error::Error as StdError, sync::Arc};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Token cannot be used as a header value. Must be ASCII.")]
    InvalidHeaderValue,
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("Request failed: {0}")]
    Request(#[from] Arc<reqwest::Error>),
}

/// What went wrong while obtaining a token.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationErrorKind {
    #[error("token endpoint responded with status {0}")]
    UnexpectedStatus(u16),
    #[error("token request could not be sent")]
    Transport,
    #[error("token response has no body")]
    EmptyBody,
    #[error("token response could not be parsed")]
    MalformedBody,
    #[error("token response is missing `{0}`")]
    MissingField(&'static str),
    #[error("token response has a non-numeric `expires_in`")]
    InvalidExpiresIn,
    #[error("token request could not be encoded")]
    RequestEncoding,
}

/// The single failure mode of [`TokenProvider::get_token`](crate::TokenProvider::get_token).
///
/// The underlying cause, if any, is kept and exposed through [`StdError::source`].
/// Messages never contain the client secret.
#[derive(Debug, Clone)]
pub struct AuthenticationError {
    kind: AuthenticationErrorKind,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl AuthenticationError {
    pub(crate) fn new(kind: AuthenticationErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn with_source(
        kind: AuthenticationErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: Some(Arc::from(source.into())),
        }
    }

    #[must_use]
    pub fn kind(&self) -> AuthenticationErrorKind {
        self.kind
    }
}

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Authentication failed: {}", self.kind)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for AuthenticationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AuthenticationError::with_source(AuthenticationErrorKind::Transport, io);

        assert_eq!(err.kind(), AuthenticationErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "Authentication failed: token request could not be sent: refused"
        );
        assert_eq!(err.source().unwrap().to_string(), "refused");
    }

    #[test]
    fn test_converts_into_crate_error() {
        let err: Error =
            AuthenticationError::new(AuthenticationErrorKind::UnexpectedStatus(401)).into();
        assert_eq!(
            err.to_string(),
            "Authentication failed: token endpoint responded with status 401"
        );
    }
}
