//! Response hardening, same-origin enforcement and login throttling.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{extract::ClientIp, state::AppState, ApiError};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
     script-src 'self' 'unsafe-inline'; base-uri 'self'; frame-ancestors 'none'";

/// Reject cross-origin state-changing requests, then stamp security headers
/// on every response, rejections included.
pub async fn harden(req: Request, next: Next) -> Response {
    let mutating = matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH | Method::DELETE);
    let mut resp = if mutating && !is_same_origin(&req) {
        tracing::warn!(
            method = %req.method(),
            path = req.uri().path(),
            origin = ?req.headers().get(header::ORIGIN),
            "cross-origin request blocked"
        );
        ApiError::Forbidden("cross-origin request blocked").into_response()
    } else {
        next.run(req).await
    };
    apply_security_headers(resp.headers_mut());
    resp
}

/// Admit at most the limiter's cap of requests per client address.
///
/// # Errors
/// [`ApiError::TooManyRequests`] once the window is full.
pub async fn throttle(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter.allow(ip) {
        tracing::warn!(%ip, path = req.uri().path(), "rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(req).await)
}

/// A missing `Origin` is allowed: same-origin form posts and non-browser
/// clients omit it.
fn is_same_origin(req: &Request) -> bool {
    let Some(origin) = req.headers().get(header::ORIGIN) else {
        return true;
    };
    let Some(host) = request_host(req) else {
        return false;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .is_some_and(|rest| rest == host)
}

fn request_host(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY_POLICY));
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http};

    use super::*;

    fn request(origin: Option<&str>, host: &str) -> Request {
        let mut builder = http::Request::builder().method(Method::POST).uri("/api/login").header(header::HOST, host);
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        match builder.body(Body::empty()) {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        }
    }

    #[test]
    fn missing_origin_is_same_origin() {
        assert!(is_same_origin(&request(None, "tutor.example")));
    }

    #[test]
    fn matching_origin_passes_for_both_schemes() {
        assert!(is_same_origin(&request(Some("http://tutor.example:8080"), "tutor.example:8080")));
        assert!(is_same_origin(&request(Some("https://tutor.example"), "tutor.example")));
    }

    #[test]
    fn foreign_or_malformed_origin_fails() {
        assert!(!is_same_origin(&request(Some("https://evil.example"), "tutor.example")));
        assert!(!is_same_origin(&request(Some("https://tutor.example.evil"), "tutor.example")));
        assert!(!is_same_origin(&request(Some("tutor.example"), "tutor.example")));
        assert!(!is_same_origin(&request(Some("null"), "tutor.example")));
    }

    #[test]
    fn headers_are_applied() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&mut headers);
        assert_eq!(headers.get(header::X_FRAME_OPTIONS), Some(&HeaderValue::from_static("DENY")));
        assert!(headers
            .get(header::CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("frame-ancestors 'none'")));
    }
}
