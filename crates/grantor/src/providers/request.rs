use http::{
    header::{ACCEPT, CONTENT_TYPE},
    request::Builder,
    Method,
};
use oauth2::TokenUrl;
use url::form_urlencoded;

use crate::{
    error::{AuthenticationError, AuthenticationErrorKind},
    transport::HttpRequest,
};

pub(crate) const GRANT_TYPE: &str = "client_credentials";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

fn encoding_error(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> AuthenticationError {
    AuthenticationError::with_source(AuthenticationErrorKind::RequestEncoding, e)
}

fn post(token_url: &TokenUrl, content_type: &str) -> Builder {
    http::Request::builder()
        .method(Method::POST)
        .uri(token_url.as_str())
        .header(ACCEPT, JSON_CONTENT_TYPE)
        .header(CONTENT_TYPE, content_type)
}

/// `POST` with `params` as a form-encoded body.
pub(crate) fn form(
    token_url: &TokenUrl,
    params: &[(&str, &str)],
    builder: impl FnOnce(Builder) -> Builder,
) -> Result<HttpRequest, AuthenticationError> {
    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    builder(post(token_url, FORM_CONTENT_TYPE))
        .body(body.into_bytes())
        .map_err(encoding_error)
}

/// `POST` with `body` serialized as JSON.
pub(crate) fn json(
    token_url: &TokenUrl,
    body: &serde_json::Value,
    builder: impl FnOnce(Builder) -> Builder,
) -> Result<HttpRequest, AuthenticationError> {
    let body = serde_json::to_vec(body).map_err(encoding_error)?;
    builder(post(token_url, JSON_CONTENT_TYPE))
        .body(body)
        .map_err(encoding_error)
}
