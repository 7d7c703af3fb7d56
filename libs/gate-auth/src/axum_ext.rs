//! Axum extractor and middleware for the route gate

use crate::{
    errors::GateError,
    metrics::{GateMetricLabels, GateMetrics, NoOpMetrics},
    policy::RoutePolicyEngine,
    session::{ResolvedSession, SessionResolver},
    types::{Decision, DenyReason, SessionContext},
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use std::time::Instant;

/// Query parameter appended to the redirect when a Directory Store lookup failed
pub const LOOKUP_FAILED_QUERY: &str = "error=role_fetch_failed";

/// Extractor for the caller's `SessionContext` - requires `route_gate` to have run
#[derive(Debug, Clone)]
pub struct Session(pub SessionContext);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .map(Session)
            .ok_or(GateError::Internal(
                "SessionContext not found - route gate not configured".to_owned(),
            ))
    }
}

/// Shared state of the `route_gate` middleware.
///
/// Built once at startup by the HTTP layer, which owns the Auth Service and
/// Directory Store clients inside it.
#[derive(Clone)]
pub struct GateState {
    resolver: SessionResolver,
    engine: Arc<RoutePolicyEngine>,
    metrics: Arc<dyn GateMetrics>,
}

impl GateState {
    #[must_use]
    pub fn new(resolver: SessionResolver, engine: RoutePolicyEngine) -> Self {
        Self {
            resolver,
            engine: Arc::new(engine),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GateMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Route gate middleware
///
/// 1. Lets CORS preflight requests through untouched
/// 2. Resolves the caller's session once (Auth Service failures mean signed out)
/// 3. Asks the policy engine about the request path
/// 4. Allow: inserts `SessionContext` into extensions and runs the handler
/// 5. Redirect: answers `307 Temporary Redirect` to the rule's target
///
/// Cookies rotated by the Auth Service are attached to either response.
pub async fn route_gate(
    State(GateState {
        resolver,
        engine,
        metrics,
    }): State<GateState>,
    mut request: Request,
    next: Next,
) -> Response {
    // 1. Preflight: skip the gate
    if is_preflight_request(request.method(), request.headers()) {
        return next.run(request).await;
    }

    // 2. Resolve session
    let started = Instant::now();
    let path = request.uri().path().to_owned();
    let ResolvedSession {
        context,
        set_cookies,
    } = resolver.resolve(request.headers()).await;

    // 3. Decide
    let decision = engine.decide(&path, &context).await;
    metrics.record_duration(
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        &GateMetricLabels::default(),
    );

    // 4./5. Pass through or redirect
    let mut response = match decision {
        Decision::Allow => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Decision::Redirect { target, reason } => redirect_response(&target, reason),
    };

    append_cookies(response.headers_mut(), set_cookies);
    response
}

fn redirect_response(target: &str, reason: DenyReason) -> Response {
    if reason == DenyReason::LookupFailed {
        let separator = if target.contains('?') { '&' } else { '?' };
        let location = format!("{target}{separator}{LOOKUP_FAILED_QUERY}");
        return Redirect::temporary(&location).into_response();
    }
    Redirect::temporary(target).into_response()
}

fn append_cookies(headers: &mut HeaderMap, cookies: Vec<HeaderValue>) {
    for cookie in cookies {
        headers.append(header::SET_COOKIE, cookie);
    }
}

/// Check if this is a CORS preflight request
///
/// Preflight requests are OPTIONS requests with:
/// - Origin header present
/// - Access-Control-Request-Method header present
fn is_preflight_request(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn lookup_failure_redirect_carries_error_query() {
        let response = redirect_response("/unauthorized", DenyReason::LookupFailed);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/unauthorized?error=role_fetch_failed"
        );

        let response = redirect_response("/unauthorized?from=admin", DenyReason::LookupFailed);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/unauthorized?from=admin&error=role_fetch_failed"
        );
    }

    #[test]
    fn plain_redirect_keeps_target() {
        let response = redirect_response("/sign-in", DenyReason::Unauthenticated);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/sign-in");
    }

    #[test]
    fn preflight_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_preflight_request(&Method::OPTIONS, &headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://shop.example"));
        headers.insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("GET"),
        );
        assert!(is_preflight_request(&Method::OPTIONS, &headers));
        assert!(!is_preflight_request(&Method::GET, &headers));
    }
}
