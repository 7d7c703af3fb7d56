use gate_auth::LookupError;
use http::{header::AUTHORIZATION, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use crate::{config::DirectoryConfig, error::DirectoryError};

/// Header the hosted backend expects the project key in
const API_KEY_HEADER: &str = "apikey";

/// Thin `reqwest` wrapper shared by the Auth Service and Directory Store adapters.
///
/// `reqwest::Client` is `Clone + Send + Sync`, no external locking needed.
#[derive(Clone)]
pub(crate) struct BackendClient {
    http: reqwest::Client,
    base: Url,
    api_key: Arc<SecretString>,
}

impl BackendClient {
    pub(crate) fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let base = config.base_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| DirectoryError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base,
            api_key: Arc::new(SecretString::from(
                config.api_key.expose_secret().to_owned(),
            )),
        })
    }

    /// Resolve an endpoint path (no leading `/`) under the project URL
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        // Joining a relative path onto an http(s) base cannot fail.
        self.base.join(path).unwrap_or_else(|_| self.base.clone())
    }

    /// Request carrying the project key; `bearer` overrides the Authorization token
    pub(crate) fn request(
        &self,
        method: Method,
        url: Url,
        bearer: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        let token = bearer.unwrap_or(key);
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, key)
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Run a Directory Store select and decode the returned rows
    pub(crate) async fn select<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, LookupError> {
        let response = self
            .request(Method::GET, url, None)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| LookupError::Query(format!("unreadable rows: {e}")))
    }
}

/// Transport failures (connect, timeout) are worth a retry
pub(crate) fn transport_error(e: &reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Unavailable(format!("timed out: {e}"))
    } else if e.is_connect() {
        LookupError::Unavailable(format!("connection error: {e}"))
    } else if e.is_decode() {
        LookupError::Query(format!("unreadable response: {e}"))
    } else {
        LookupError::Unavailable(format!("request error: {e}"))
    }
}

/// 5xx and 429 are transient; any other non-success status is a rejected query
pub(crate) fn status_error(status: StatusCode, body: &str) -> LookupError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        LookupError::Unavailable(message)
    } else {
        LookupError::Query(message)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
