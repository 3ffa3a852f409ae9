use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A bearer token issued by a token endpoint.
///
/// Tokens are immutable. The serialized form is the on-disk format used by the
/// file-backed cache: `value`, `token_type` and `expires_at` as epoch milliseconds.
/// Unknown fields are ignored when reading.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, veil::Redact)]
pub struct AccessToken {
    #[redact]
    value: String,
    token_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    #[must_use]
    pub fn new(
        value: impl Into<String>,
        token_type: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value: value.into(),
            token_type: token_type.into(),
            expires_at,
        }
    }

    /// The opaque token, without the token type prefix.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns `true` if the token is still usable `margin` after `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(margin)
            .is_some_and(|deadline| deadline < self.expires_at)
    }

    #[must_use]
    pub fn is_valid(&self, margin: Duration) -> bool {
        self.is_valid_at(Utc::now(), margin)
    }

    /// Value for an `Authorization` header, e.g. `Bearer abc`.
    pub(crate) fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.value)
    }
}
