use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use http::header::CONTENT_TYPE;
use serde_json::Value;
use url::form_urlencoded;

use crate::{
    error::{AuthenticationError, AuthenticationErrorKind},
    token::AccessToken,
    transport::HttpResponse,
};

pub(crate) type Fields = HashMap<String, Value>;

/// Decode a token response body. JSON unless the server declares a form-encoded body.
pub(crate) fn parse_body(response: &HttpResponse) -> Result<Fields, AuthenticationError> {
    let body = response.body();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AuthenticationError::new(AuthenticationErrorKind::EmptyBody));
    }

    let form_encoded = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if form_encoded {
        return Ok(form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect());
    }

    serde_json::from_slice(body)
        .map_err(|e| AuthenticationError::with_source(AuthenticationErrorKind::MalformedBody, e))
}

/// Build the token described by `fields`, received at `now`.
pub(crate) fn access_token(
    fields: &Fields,
    now: DateTime<Utc>,
) -> Result<AccessToken, AuthenticationError> {
    let value = string_field(fields, "access_token")?;
    let token_type = string_field(fields, "token_type")?;
    let expires_in = expires_in(fields)?;

    let expires_at = i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AuthenticationError::new(AuthenticationErrorKind::InvalidExpiresIn))?;

    Ok(AccessToken::new(value, token_type, expires_at))
}

fn field<'a>(fields: &'a Fields, name: &'static str) -> Result<&'a Value, AuthenticationError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(AuthenticationError::new(
            AuthenticationErrorKind::MissingField(name),
        )),
        Some(value) => Ok(value),
    }
}

fn string_field<'a>(
    fields: &'a Fields,
    name: &'static str,
) -> Result<&'a str, AuthenticationError> {
    field(fields, name)?
        .as_str()
        .ok_or_else(|| AuthenticationError::new(AuthenticationErrorKind::MalformedBody))
}

/// Seconds until expiry. Form-encoded responses carry it as a string.
fn expires_in(fields: &Fields) -> Result<u64, AuthenticationError> {
    let seconds = match field(fields, "expires_in")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    seconds.ok_or_else(|| AuthenticationError::new(AuthenticationErrorKind::InvalidExpiresIn))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn response(content_type: &str, body: &str) -> HttpResponse {
        http::Response::builder()
            .status(200)
            .header(CONTENT_TYPE, content_type)
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    fn fields(value: Value) -> Fields {
        serde_json::from_value(value).unwrap()
    }

    fn kind(result: Result<AccessToken, AuthenticationError>) -> AuthenticationErrorKind {
        result.unwrap_err().kind()
    }

    #[test]
    fn test_json_body() {
        let parsed = parse_body(&response(
            "application/json;charset=UTF-8",
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600,"scope":"a b"}"#,
        ))
        .unwrap();

        assert_eq!(parsed["access_token"], json!("abc"));
        assert_eq!(parsed["expires_in"], json!(3600));
        assert_eq!(parsed["scope"], json!("a b"));
    }

    #[test]
    fn test_form_body() {
        let parsed = parse_body(&response(
            "application/x-www-form-urlencoded",
            "access_token=a%2Bb&token_type=bearer&expires_in=60",
        ))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let token = access_token(&parsed, now).unwrap();
        assert_eq!(token.value(), "a+b");
        assert_eq!(token.token_type(), "bearer");
        assert_eq!(token.expires_at(), now + TimeDelta::seconds(60));
    }

    #[test]
    fn test_body_must_be_present_and_an_object() {
        let err = parse_body(&response("application/json", " \n")).unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::EmptyBody);

        let err = parse_body(&response("application/json", "[1, 2]")).unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::MalformedBody);
    }

    #[test]
    fn test_expires_at_is_relative_to_receipt() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let token = access_token(
            &fields(json!({"access_token": "abc", "token_type": "Bearer", "expires_in": 3600})),
            now,
        )
        .unwrap();

        assert_eq!(token, AccessToken::new("abc", "Bearer", now + TimeDelta::hours(1)));
    }

    #[test]
    fn test_required_fields() {
        let now = Utc::now();
        assert_eq!(
            kind(access_token(&fields(json!({"token_type": "Bearer", "expires_in": 1})), now)),
            AuthenticationErrorKind::MissingField("access_token")
        );
        assert_eq!(
            kind(access_token(&fields(json!({"access_token": "abc", "expires_in": 1})), now)),
            AuthenticationErrorKind::MissingField("token_type")
        );
        assert_eq!(
            kind(access_token(
                &fields(json!({"access_token": "abc", "token_type": "Bearer", "expires_in": null})),
                now
            )),
            AuthenticationErrorKind::MissingField("expires_in")
        );
        assert_eq!(
            kind(access_token(
                &fields(json!({"access_token": 42, "token_type": "Bearer", "expires_in": 1})),
                now
            )),
            AuthenticationErrorKind::MalformedBody
        );
    }

    #[test]
    fn test_expires_in_must_be_a_non_negative_integer() {
        let now = Utc::now();
        for expires_in in [json!("soon"), json!(-5), json!(1.5), json!(true), json!(u64::MAX)] {
            let body = json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": expires_in
            });
            let result = access_token(&fields(body), now);
            assert_eq!(kind(result), AuthenticationErrorKind::InvalidExpiresIn);
        }

        let numeric_string = access_token(
            &fields(json!({"access_token": "abc", "token_type": "Bearer", "expires_in": "120"})),
            now,
        )
        .unwrap();
        assert_eq!(numeric_string.expires_at(), now + TimeDelta::seconds(120));
    }
}
