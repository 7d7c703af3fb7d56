use thiserror::Error;

/// Failure of a Directory Store query.
///
/// "User has no roles" is not an error; lookups return an empty set for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Store could not be reached or answered with a server error. Worth one retry.
    #[error("directory store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected the query or returned an unreadable payload.
    #[error("directory query failed: {0}")]
    Query(String),
}

impl LookupError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Unavailable(_))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Unavailable(_) => "unavailable",
            LookupError::Query(_) => "query",
        }
    }
}

/// Failure of the Auth Service itself, as opposed to "no session"
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthServiceError {
    #[error("auth service unavailable: {0}")]
    Unavailable(String),

    #[error("auth service returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthServiceError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuthServiceError::Unavailable(_) => "unavailable",
            AuthServiceError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Wiring errors surfaced by the HTTP layer
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "axum-ext")]
impl axum::response::IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::response::Json;
        use serde_json::json;

        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
