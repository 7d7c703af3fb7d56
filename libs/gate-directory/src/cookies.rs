//! Session cookie helpers

use http::{header, HeaderMap, HeaderValue};

/// Refresh tokens outlive the access token; keep the cookie for 400 days.
pub(crate) const REFRESH_COOKIE_MAX_AGE: u64 = 400 * 24 * 60 * 60;

/// Read one cookie from the request's `Cookie` headers
pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// Read a bearer token from the `Authorization` header
pub(crate) fn read_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

/// `Set-Cookie` value for a rotated session token. `None` if the token is not header-safe.
pub(crate) fn session_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax{secure}"
    ))
    .ok()
}

/// `Set-Cookie` value that removes a session cookie
pub(crate) fn clear_cookie(name: &str, secure: bool) -> Option<HeaderValue> {
    session_cookie(name, "", 0, secure)
}
