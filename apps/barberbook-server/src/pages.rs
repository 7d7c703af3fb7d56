use axum::{
    extract::Query,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use gate_auth::axum_ext::Session;
use serde::Deserialize;

/// Placeholder pages for every route the gate protects or redirects to.
/// Rendering lives in the web frontend; these only prove the gate let the request through.
#[must_use]
pub fn routes() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/sign-in", get(|| page("Sign in")))
        .route("/sign-up", get(|| page("Sign up")))
        .route("/unauthorized", get(unauthorized))
        .route("/pending-approval", get(pending_approval))
        .route("/protected", get(dashboard))
        .route("/protected/{*rest}", get(dashboard))
        .route("/admin", get(|| page("Admin")))
        .route("/admin/{*rest}", get(|| page("Admin")))
        .route("/barber", get(|| page("Barber")))
        .route("/barber/{*rest}", get(|| page("Barber")))
        .route("/bookings/manage", get(|| page("Manage bookings")))
        .route("/health", get(|| async { "ok" }))
}

async fn page(title: &'static str) -> Html<String> {
    Html(format!("<h1>{title}</h1>"))
}

async fn home(Session(session): Session) -> impl IntoResponse {
    let greeting = match session.user_id() {
        Some(user_id) => format!("Signed in as {user_id}"),
        None => "Book your next cut".to_owned(),
    };
    Html(format!("<h1>Barberbook</h1><p>{greeting}</p>"))
}

async fn dashboard(Session(session): Session) -> impl IntoResponse {
    let user = session
        .user_id()
        .map_or_else(String::new, ToString::to_string);
    Html(format!("<h1>Dashboard</h1><p>{user}</p>"))
}

/// `?error=` set by the gate when a Directory Store lookup failed
#[derive(Debug, Deserialize)]
struct GateErrorQuery {
    error: Option<String>,
}

impl GateErrorQuery {
    fn lookup_failed(&self) -> bool {
        self.error.as_deref() == Some("role_fetch_failed")
    }
}

const LOOKUP_FAILED_TEXT: &str = "We could not check your account right now. Please try again.";

async fn unauthorized(Query(query): Query<GateErrorQuery>) -> impl IntoResponse {
    let detail = if query.lookup_failed() {
        LOOKUP_FAILED_TEXT
    } else {
        "You do not have access to that page."
    };
    Html(format!("<h1>Unauthorized</h1><p>{detail}</p>"))
}

async fn pending_approval(Query(query): Query<GateErrorQuery>) -> impl IntoResponse {
    let detail = if query.lookup_failed() {
        LOOKUP_FAILED_TEXT
    } else {
        "Your barber profile is awaiting approval."
    };
    Html(format!("<h1>Barber profile</h1><p>{detail}</p>"))
}
