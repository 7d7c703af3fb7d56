use crate::{
    metrics::{GateEvent, GateMetricLabels, GateMetrics, NoOpMetrics},
    traits::{AuthLookup, AuthService},
    types::SessionContext,
};
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;

/// Session for one request plus any cookies the Auth Service rotated
#[derive(Debug, Clone, Default)]
pub struct ResolvedSession {
    pub context: SessionContext,
    pub set_cookies: Vec<HeaderValue>,
}

/// Resolves the caller of a request through the Auth Service.
///
/// Never fails: a missing session and a failing Auth Service both yield an
/// anonymous context, so protected routes stay closed during an outage.
#[derive(Clone)]
pub struct SessionResolver {
    auth: Arc<dyn AuthService>,
    metrics: Arc<dyn GateMetrics>,
}

impl SessionResolver {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self {
            auth,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GateMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> ResolvedSession {
        match self.auth.current_user(headers).await {
            Ok(AuthLookup {
                user_id,
                set_cookies,
            }) => {
                if !set_cookies.is_empty() {
                    self.metrics
                        .record_event(GateEvent::SessionRefreshed, &GateMetricLabels::default());
                }
                let context = user_id.map_or_else(SessionContext::anonymous, SessionContext::authenticated);
                ResolvedSession {
                    context,
                    set_cookies,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Auth service call failed, treating caller as signed out");
                self.metrics.record_event(
                    GateEvent::SessionResolveFailed,
                    &GateMetricLabels::default().with_error_type(err.kind()),
                );
                ResolvedSession::default()
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{errors::AuthServiceError, types::UserId};
    use async_trait::async_trait;

    struct FixedAuth(Result<AuthLookup, AuthServiceError>);

    #[async_trait]
    impl AuthService for FixedAuth {
        async fn current_user(&self, _headers: &HeaderMap) -> Result<AuthLookup, AuthServiceError> {
            self.0.clone()
        }
    }

    fn resolver(result: Result<AuthLookup, AuthServiceError>) -> SessionResolver {
        SessionResolver::new(Arc::new(FixedAuth(result)))
    }

    #[tokio::test]
    async fn signed_in_user_is_authenticated() {
        let resolved = resolver(Ok(AuthLookup {
            user_id: Some(UserId::new("user-1")),
            set_cookies: vec![],
        }))
        .resolve(&HeaderMap::new())
        .await;

        assert!(resolved.context.is_authenticated());
        assert_eq!(resolved.context.user_id(), Some(&UserId::new("user-1")));
        assert!(resolved.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn no_session_is_anonymous() {
        let resolved = resolver(Ok(AuthLookup::default()))
            .resolve(&HeaderMap::new())
            .await;
        assert!(!resolved.context.is_authenticated());
    }

    #[tokio::test]
    async fn auth_service_failure_is_anonymous() {
        let resolved = resolver(Err(AuthServiceError::Unavailable("503".to_owned())))
            .resolve(&HeaderMap::new())
            .await;
        assert!(!resolved.context.is_authenticated());
        assert!(resolved.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn refreshed_cookies_are_passed_through() {
        let cookie = HeaderValue::from_static("sb-access-token=new; Path=/; HttpOnly");
        let resolved = resolver(Ok(AuthLookup {
            user_id: Some(UserId::new("user-1")),
            set_cookies: vec![cookie.clone()],
        }))
        .resolve(&HeaderMap::new())
        .await;

        assert_eq!(resolved.set_cookies, vec![cookie]);
    }
}
