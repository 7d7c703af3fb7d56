use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::DirectoryError;

/// Connection settings for the hosted Auth Service and Directory Store.
///
/// Both live behind the same project URL and API key.
#[derive(Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Project base URL, e.g. `https://abc.backend.example`
    #[serde(default = "default_url")]
    pub url: String,

    /// Project API key. Never serialized.
    #[serde(
        default = "empty_secret",
        deserialize_with = "deserialize_secret",
        skip_serializing
    )]
    pub api_key: SecretString,

    /// Cookie carrying the access token
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,

    /// Cookie carrying the refresh token
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Mark rotated session cookies `Secure`
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
}

fn default_url() -> String {
    "http://127.0.0.1:54321".to_owned()
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_access_cookie() -> String {
    "sb-access-token".to_owned()
}

fn default_refresh_cookie() -> String {
    "sb-refresh-token".to_owned()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_cookie_secure() -> bool {
    true
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: empty_secret(),
            access_cookie: default_access_cookie(),
            refresh_cookie: default_refresh_cookie(),
            timeout_ms: default_timeout_ms(),
            cookie_secure: default_cookie_secure(),
        }
    }
}

impl DirectoryConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse the project URL, normalised to end with `/` so endpoint paths join under it.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidUrl`] when `url` is not an absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url, DirectoryError> {
        let mut url = Url::parse(&self.url).map_err(|e| DirectoryError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DirectoryError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
