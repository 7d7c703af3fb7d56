use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use gate_auth::{
    axum_ext::{route_gate, GateState, Session},
    ApprovalLookup, ApprovalStatus, AuthLookup, AuthService, AuthServiceError, DirectoryLookups,
    GateConfig, LookupError, PermissionLookup, RoleLookup, RoutePolicyEngine, SessionResolver,
    UserId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

const REFRESHED_COOKIE: &str = "sb-access-token=rotated; Path=/; HttpOnly; SameSite=Lax";

/// Auth service driven by test headers:
/// - `x-test-user`: the signed-in user id
/// - `x-test-refresh`: emit a rotated session cookie
/// - `x-test-auth-down`: fail as if the service were unreachable
struct HeaderAuth;

#[async_trait]
impl AuthService for HeaderAuth {
    async fn current_user(&self, headers: &HeaderMap) -> Result<AuthLookup, AuthServiceError> {
        if headers.contains_key("x-test-auth-down") {
            return Err(AuthServiceError::Unavailable("connection refused".to_owned()));
        }
        let user_id = headers
            .get("x-test-user")
            .and_then(|v| v.to_str().ok())
            .map(UserId::new);
        let set_cookies = if headers.contains_key("x-test-refresh") {
            vec![HeaderValue::from_static(REFRESHED_COOKIE)]
        } else {
            vec![]
        };
        Ok(AuthLookup {
            user_id,
            set_cookies,
        })
    }
}

#[derive(Default)]
struct MemoryDirectory {
    roles: HashMap<String, BTreeSet<String>>,
    approvals: HashMap<String, ApprovalStatus>,
    broken_users: BTreeSet<String>,
}

impl MemoryDirectory {
    fn with_roles(mut self, user: &str, roles: &[&str]) -> Self {
        self.roles.insert(
            user.to_owned(),
            roles.iter().map(|r| (*r).to_owned()).collect(),
        );
        self
    }

    fn with_approval(mut self, user: &str, status: ApprovalStatus) -> Self {
        self.approvals.insert(user.to_owned(), status);
        self
    }

    fn with_broken_user(mut self, user: &str) -> Self {
        self.broken_users.insert(user.to_owned());
        self
    }
}

#[async_trait]
impl RoleLookup for MemoryDirectory {
    async fn roles_for(&self, user_id: &UserId) -> Result<BTreeSet<String>, LookupError> {
        if self.broken_users.contains(user_id.as_str()) {
            return Err(LookupError::Unavailable("timeout".to_owned()));
        }
        Ok(self.roles.get(user_id.as_str()).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PermissionLookup for MemoryDirectory {
    async fn permissions_for(&self, _user_id: &UserId) -> Result<BTreeSet<String>, LookupError> {
        Ok(BTreeSet::new())
    }
}

#[async_trait]
impl ApprovalLookup for MemoryDirectory {
    async fn approval_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ApprovalStatus>, LookupError> {
        Ok(self.approvals.get(user_id.as_str()).copied())
    }
}

async fn whoami(Session(session): Session) -> impl IntoResponse {
    match session.user_id() {
        Some(id) => format!("user:{id}"),
        None => "anonymous".to_owned(),
    }
}

async fn page() -> impl IntoResponse {
    "OK"
}

fn build_test_router(directory: MemoryDirectory) -> Router {
    let table = GateConfig::default().build_rule_table().unwrap();
    let engine = RoutePolicyEngine::new(table, DirectoryLookups::from_store(Arc::new(directory)));
    let state = GateState::new(SessionResolver::new(Arc::new(HeaderAuth)), engine);

    Router::new()
        .route("/", get(whoami))
        .route("/sign-in", get(page))
        .route("/protected", get(whoami))
        .route("/protected/{*rest}", get(whoami))
        .route("/admin/{*rest}", get(page))
        .route("/barber/schedule", get(page))
        .route("/bookings/manage", get(page))
        .route("/administrator", get(page))
        .layer(middleware::from_fn_with_state(state, route_gate))
}

fn get_request(uri: &str, headers: &[(&'static str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_anonymous_is_redirected_from_protected() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app.oneshot(get_request("/protected/x", &[])).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/sign-in");
}

#[tokio::test]
async fn test_signed_in_user_reaches_handler_with_session() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .oneshot(get_request("/protected", &[("x-test-user", "user-1")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user:user-1");
}

#[tokio::test]
async fn test_unmatched_path_passes_for_anyone() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app.clone().oneshot(get_request("/", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "anonymous");

    // Segment-aware prefix: "/administrator" is not under "/admin".
    let response = app
        .oneshot(get_request("/administrator", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_role_gate_redirects_user_without_role() {
    let app = build_test_router(MemoryDirectory::default().with_roles("user-1", &["customer"]));

    let response = app
        .oneshot(get_request("/admin/users", &[("x-test-user", "user-1")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/unauthorized");
}

#[tokio::test]
async fn test_role_gate_allows_admin() {
    let app = build_test_router(MemoryDirectory::default().with_roles("root", &["admin"]));

    let response = app
        .clone()
        .oneshot(get_request("/admin/users", &[("x-test-user", "root")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Admin bypasses the barber approval check.
    let response = app
        .oneshot(get_request("/barber/schedule", &[("x-test-user", "root")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_signed_in_user_is_sent_away_from_sign_in() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .clone()
        .oneshot(get_request("/sign-in", &[("x-test-user", "user-1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/protected");

    let response = app.oneshot(get_request("/sign-in", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_lookup_failure_redirect_carries_error_query() {
    let app = build_test_router(MemoryDirectory::default().with_broken_user("user-1"));

    let response = app
        .oneshot(get_request("/bookings/manage", &[("x-test-user", "user-1")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/unauthorized?error=role_fetch_failed"
    );
}

#[tokio::test]
async fn test_pending_barber_goes_to_pending_approval() {
    let app = build_test_router(
        MemoryDirectory::default()
            .with_roles("barber-1", &["barber"])
            .with_approval("barber-1", ApprovalStatus::Pending)
            .with_roles("barber-2", &["barber"])
            .with_approval("barber-2", ApprovalStatus::Approved),
    );

    let response = app
        .clone()
        .oneshot(get_request("/barber/schedule", &[("x-test-user", "barber-1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/pending-approval");

    let response = app
        .oneshot(get_request("/barber/schedule", &[("x-test-user", "barber-2")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_service_failure_treated_as_signed_out() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .clone()
        .oneshot(get_request(
            "/protected",
            &[("x-test-user", "user-1"), ("x-test-auth-down", "1")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/sign-in");

    // Public pages stay reachable during the outage.
    let response = app
        .oneshot(get_request("/", &[("x-test-auth-down", "1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refreshed_cookies_reach_allowed_response() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .oneshot(get_request(
            "/protected",
            &[("x-test-user", "user-1"), ("x-test-refresh", "1")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::SET_COOKIE], REFRESHED_COOKIE);
}

#[tokio::test]
async fn test_refreshed_cookies_reach_redirect_response() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .oneshot(get_request(
            "/admin/users",
            &[("x-test-user", "user-1"), ("x-test-refresh", "1")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies, vec![REFRESHED_COOKIE]);
}

#[tokio::test]
async fn test_preflight_bypasses_gate() {
    let app = build_test_router(MemoryDirectory::default());

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/admin/users")
                .header("Origin", "https://shop.example")
                .header("Access-Control-Request-Method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Reaches the router (no OPTIONS handler), not the gate's redirect.
    assert_ne!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(response.headers().get(header::LOCATION).is_none());
}
