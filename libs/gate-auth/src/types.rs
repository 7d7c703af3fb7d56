use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a rule pattern is compared with the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Path must equal the pattern.
    Exact,
    /// Path must equal the pattern or continue it with a `/`-separated segment.
    #[default]
    #[serde(alias = "starts_with")]
    Prefix,
}

impl MatchKind {
    #[must_use]
    pub fn matches(self, pattern: &str, path: &str) -> bool {
        match self {
            MatchKind::Exact => path == pattern,
            MatchKind::Prefix => segment_prefix(pattern, path),
        }
    }
}

/// `/admin` covers `/admin` and `/admin/barbers`, never `/admins`.
fn segment_prefix(pattern: &str, path: &str) -> bool {
    let base = pattern.trim_end_matches('/');
    if base.is_empty() {
        return path.starts_with('/');
    }
    path.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Approval requirement attached to a role-gated rule.
///
/// Applies only to callers whose granted roles on that rule are exactly `role`,
/// so an admin passing a barber rule is not asked for a barber profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub role: String,
    pub redirect_to: String,
}

/// Protection mode of a route rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection {
    /// Caller must be signed in.
    Authenticated,
    /// Caller must be signed out (sign-in and sign-up pages).
    Unauthenticated,
    /// Caller must hold at least one of `roles`.
    RoleGated {
        roles: BTreeSet<String>,
        approval: Option<ApprovalGate>,
    },
    /// Caller must hold at least one of `permissions` through any of their roles.
    PermissionGated { permissions: BTreeSet<String> },
}

impl Protection {
    #[must_use]
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Protection::RoleGated {
            roles: roles.into_iter().map(Into::into).collect(),
            approval: None,
        }
    }

    #[must_use]
    pub fn permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Protection::PermissionGated {
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Short name used in logs and metric labels
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Protection::Authenticated => "authenticated",
            Protection::Unauthenticated => "unauthenticated",
            Protection::RoleGated { .. } => "role",
            Protection::PermissionGated { .. } => "permission",
        }
    }

    /// Whether a caller without a session is always denied by this protection
    #[must_use]
    pub fn requires_session(&self) -> bool {
        !matches!(self, Protection::Unauthenticated)
    }
}

/// A single entry of the ordered route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub pattern: String,
    pub match_kind: MatchKind,
    pub protection: Protection,
    pub redirect_to: String,
}

impl RouteRule {
    #[must_use]
    pub fn exact(
        pattern: impl Into<String>,
        protection: Protection,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            match_kind: MatchKind::Exact,
            protection,
            redirect_to: redirect_to.into(),
        }
    }

    #[must_use]
    pub fn prefix(
        pattern: impl Into<String>,
        protection: Protection,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            match_kind: MatchKind::Prefix,
            protection,
            redirect_to: redirect_to.into(),
        }
    }

    /// Attach an approval gate. No-op for rules that are not role-gated.
    #[must_use]
    pub fn with_approval(mut self, role: impl Into<String>, redirect_to: impl Into<String>) -> Self {
        if let Protection::RoleGated { approval, .. } = &mut self.protection {
            *approval = Some(ApprovalGate {
                role: role.into(),
                redirect_to: redirect_to.into(),
            });
        }
        self
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.match_kind.matches(&self.pattern, path)
    }

    /// Whether every path this rule matches is also matched by `earlier`
    #[must_use]
    pub fn is_covered_by(&self, earlier: &RouteRule) -> bool {
        match (earlier.match_kind, self.match_kind) {
            (MatchKind::Exact, MatchKind::Exact) => earlier.pattern == self.pattern,
            (MatchKind::Exact, MatchKind::Prefix) => false,
            (MatchKind::Prefix, _) => earlier.matches(&self.pattern),
        }
    }

    pub(crate) fn deny(&self, reason: DenyReason) -> Decision {
        Decision::Redirect {
            target: self.redirect_to.clone(),
            reason,
        }
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.match_kind {
            MatchKind::Exact => "=",
            MatchKind::Prefix => "^",
        };
        write!(f, "{kind}{} ({})", self.pattern, self.protection.kind())
    }
}

/// Opaque user identifier issued by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller identity for a single request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    user_id: Option<UserId>,
}

impl SessionContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    #[must_use]
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }
}

/// Why a rule redirected the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    AlreadyAuthenticated,
    MissingRole,
    MissingPermission,
    LookupFailed,
    NotApproved,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::AlreadyAuthenticated => "already_authenticated",
            DenyReason::MissingRole => "missing_role",
            DenyReason::MissingPermission => "missing_permission",
            DenyReason::LookupFailed => "lookup_failed",
            DenyReason::NotApproved => "not_approved",
        }
    }
}

/// Outcome of evaluating the route table for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect { target: String, reason: DenyReason },
}

impl Decision {
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    #[must_use]
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Redirect { target, .. } => Some(target),
        }
    }

    #[must_use]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Redirect { reason, .. } => Some(*reason),
        }
    }
}
