//! Auth Service adapter for the hosted backend's auth API

use async_trait::async_trait;
use gate_auth::{AuthLookup, AuthService, AuthServiceError, UserId};
use http::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::{
    client::BackendClient,
    config::DirectoryConfig,
    cookies::{clear_cookie, read_bearer, read_cookie, session_cookie, REFRESH_COOKIE_MAX_AGE},
    error::DirectoryError,
};

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    user: UserPayload,
}

fn default_expires_in() -> u64 {
    3600
}

/// Resolves callers against `GET /auth/v1/user`, refreshing expired sessions
/// with the refresh-token cookie.
pub struct HostedAuthService {
    client: BackendClient,
    access_cookie: String,
    refresh_cookie: String,
    cookie_secure: bool,
}

impl HostedAuthService {
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        Ok(Self {
            client: BackendClient::new(config)?,
            access_cookie: config.access_cookie.clone(),
            refresh_cookie: config.refresh_cookie.clone(),
            cookie_secure: config.cookie_secure,
        })
    }

    /// `Ok(None)` when the backend rejects the token
    async fn fetch_user(&self, access_token: &str) -> Result<Option<UserId>, AuthServiceError> {
        let url = self.client.endpoint("auth/v1/user");
        let response = self
            .client
            .request(Method::GET, url, Some(access_token))
            .send()
            .await
            .map_err(|e| AuthServiceError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: UserPayload = response
                    .json()
                    .await
                    .map_err(|e| AuthServiceError::InvalidResponse(e.to_string()))?;
                Ok(Some(UserId::new(user.id)))
            }
            status if status.is_client_error() => {
                tracing::debug!(status = status.as_u16(), "Access token rejected");
                Ok(None)
            }
            status => Err(unexpected_status(status)),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthLookup, AuthServiceError> {
        let mut url = self.client.endpoint("auth/v1/token");
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .client
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthServiceError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let token: TokenPayload = response
                    .json()
                    .await
                    .map_err(|e| AuthServiceError::InvalidResponse(e.to_string()))?;
                let set_cookies = [
                    session_cookie(
                        &self.access_cookie,
                        &token.access_token,
                        token.expires_in,
                        self.cookie_secure,
                    ),
                    session_cookie(
                        &self.refresh_cookie,
                        &token.refresh_token,
                        REFRESH_COOKIE_MAX_AGE,
                        self.cookie_secure,
                    ),
                ]
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    AuthServiceError::InvalidResponse("token is not cookie-safe".to_owned())
                })?;

                tracing::debug!(user_id = %token.user.id, "Session refreshed");
                Ok(AuthLookup {
                    user_id: Some(UserId::new(token.user.id)),
                    set_cookies,
                })
            }
            status if status.is_client_error() => {
                // Dead refresh token: drop both cookies so the browser stops sending them.
                tracing::debug!(status = status.as_u16(), "Refresh token rejected");
                let set_cookies = [
                    clear_cookie(&self.access_cookie, self.cookie_secure),
                    clear_cookie(&self.refresh_cookie, self.cookie_secure),
                ]
                .into_iter()
                .flatten()
                .collect();
                Ok(AuthLookup {
                    user_id: None,
                    set_cookies,
                })
            }
            status => Err(unexpected_status(status)),
        }
    }
}

fn unexpected_status(status: StatusCode) -> AuthServiceError {
    if status.is_server_error() {
        AuthServiceError::Unavailable(format!("HTTP {}", status.as_u16()))
    } else {
        AuthServiceError::InvalidResponse(format!("unexpected HTTP {}", status.as_u16()))
    }
}

#[async_trait]
impl AuthService for HostedAuthService {
    async fn current_user(&self, headers: &HeaderMap) -> Result<AuthLookup, AuthServiceError> {
        let bearer = read_bearer(headers);
        let access_cookie = read_cookie(headers, &self.access_cookie);

        let mut stale_cookie = false;
        if let Some(token) = bearer.as_deref().or(access_cookie.as_deref()) {
            if let Some(user_id) = self.fetch_user(token).await? {
                return Ok(AuthLookup {
                    user_id: Some(user_id),
                    set_cookies: Vec::new(),
                });
            }
            stale_cookie = bearer.is_none();
        }

        match read_cookie(headers, &self.refresh_cookie) {
            Some(refresh_token) => self.refresh(&refresh_token).await,
            None if stale_cookie => Ok(AuthLookup {
                user_id: None,
                set_cookies: clear_cookie(&self.access_cookie, self.cookie_secure)
                    .into_iter()
                    .collect(),
            }),
            None => Ok(AuthLookup::default()),
        }
    }
}
