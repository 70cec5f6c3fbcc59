//! Session cookie transport.

use axum::http::{header, HeaderMap, HeaderValue};
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

use tutor_core::SessionToken;

use crate::ApiError;

/// Name of the cookie carrying the raw session token.
pub const SESSION_COOKIE: &str = "tutor_session";

/// `Set-Cookie` value that hands `token` to the client.
///
/// # Errors
/// Returns [`ApiError::Internal`] if the cookie is not a valid header value.
pub fn issue(token: &SessionToken, ttl: chrono::Duration, secure: bool) -> Result<HeaderValue, ApiError> {
    build(token.as_str(), CookieDuration::seconds(ttl.num_seconds()), secure)
}

/// `Set-Cookie` value that expires the session cookie immediately.
///
/// # Errors
/// Returns [`ApiError::Internal`] if the cookie is not a valid header value.
pub fn clear(secure: bool) -> Result<HeaderValue, ApiError> {
    build("", CookieDuration::ZERO, secure)
}

fn build(value: &str, max_age: CookieDuration, secure: bool) -> Result<HeaderValue, ApiError> {
    let cookie = Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .path("/")
        .build()
        .to_string();
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(format!("set-cookie header: {e}")))
}

/// Extract the session token from request cookies, if present.
#[must_use]
pub fn read(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|part| Cookie::parse(part.trim()).ok())
        .find(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
        .map(|c| SessionToken::from_raw(c.value()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_cookie_has_hardening_attributes() {
        let token = SessionToken::from_raw("abc123");
        let value = match issue(&token, chrono::Duration::days(7), true) {
            Ok(v) => v,
            Err(e) => panic!("issue failed: {e}"),
        };
        let text = value.to_str().unwrap_or_default();
        assert!(text.starts_with("tutor_session=abc123"));
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("Secure"));
        assert!(text.contains("SameSite=Lax"));
        assert!(text.contains("Path=/"));
        assert!(text.contains("Max-Age=604800"));
    }

    #[test]
    fn dev_mode_drops_secure_flag() {
        let value = match issue(&SessionToken::from_raw("t"), chrono::Duration::hours(1), false) {
            Ok(v) => v,
            Err(e) => panic!("issue failed: {e}"),
        };
        assert!(!value.to_str().unwrap_or_default().contains("Secure"));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let value = match clear(true) {
            Ok(v) => v,
            Err(e) => panic!("clear failed: {e}"),
        };
        assert!(value.to_str().unwrap_or_default().contains("Max-Age=0"));
    }

    #[test]
    fn read_finds_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; tutor_session=tok42; x=1"));
        assert_eq!(read(&headers).map(|t| t.as_str().to_owned()), Some("tok42".to_owned()));
    }

    #[test]
    fn read_ignores_missing_or_empty_cookie() {
        let mut headers = HeaderMap::new();
        assert!(read(&headers).is_none());
        headers.insert(header::COOKIE, HeaderValue::from_static("tutor_session="));
        assert!(read(&headers).is_none());
    }
}
