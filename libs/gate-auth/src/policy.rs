//! Route policy engine.
//!
//! Evaluates the first rule of a [`RuleTable`] that matches a request path.
//! Rules after the first match are never consulted, whatever the outcome.
//! Every Directory Store failure ends in a redirect.

use crate::{
    errors::LookupError,
    metrics::{GateEvent, GateMetricLabels, GateMetrics, NoOpMetrics},
    rule_table::RuleTable,
    traits::{ApprovalStatus, DirectoryLookups},
    types::{ApprovalGate, Decision, DenyReason, Protection, RouteRule, SessionContext, UserId},
};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

/// Default number of extra attempts for a transiently failing lookup
pub const DEFAULT_LOOKUP_RETRIES: u8 = 1;

#[derive(Clone)]
pub struct RoutePolicyEngine {
    table: RuleTable,
    lookups: DirectoryLookups,
    lookup_retries: u8,
    metrics: Arc<dyn GateMetrics>,
}

impl RoutePolicyEngine {
    #[must_use]
    pub fn new(table: RuleTable, lookups: DirectoryLookups) -> Self {
        Self {
            table,
            lookups,
            lookup_retries: DEFAULT_LOOKUP_RETRIES,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    #[must_use]
    pub fn with_lookup_retries(mut self, retries: u8) -> Self {
        self.lookup_retries = retries;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GateMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Decide whether `session` may reach `path`.
    ///
    /// Unmatched paths are public.
    pub async fn decide(&self, path: &str, session: &SessionContext) -> Decision {
        let Some((index, rule)) = self.table.first_match(path) else {
            tracing::trace!(path, "No route rule matched, allowing");
            return Decision::Allow;
        };

        let decision = self.evaluate(rule, session).await;
        let labels = GateMetricLabels::default().with_rule(rule.to_string());
        match &decision {
            Decision::Allow => {
                tracing::debug!(path, rule = %rule, index, "Route rule allowed request");
                self.metrics.record_event(GateEvent::Allowed, &labels);
            }
            Decision::Redirect { target, reason } => {
                tracing::info!(
                    path,
                    rule = %rule,
                    index,
                    target = %target,
                    reason = reason.as_str(),
                    user_id = ?session.user_id().map(UserId::as_str),
                    "Route rule redirected request"
                );
                self.metrics
                    .record_event(GateEvent::Redirected, &labels.with_reason(reason.as_str()));
            }
        }
        decision
    }

    async fn evaluate(&self, rule: &RouteRule, session: &SessionContext) -> Decision {
        match &rule.protection {
            Protection::Authenticated => {
                if session.is_authenticated() {
                    Decision::Allow
                } else {
                    rule.deny(DenyReason::Unauthenticated)
                }
            }
            Protection::Unauthenticated => {
                if session.is_authenticated() {
                    rule.deny(DenyReason::AlreadyAuthenticated)
                } else {
                    Decision::Allow
                }
            }
            Protection::RoleGated { roles, approval } => {
                let Some(user_id) = session.user_id() else {
                    return rule.deny(DenyReason::Unauthenticated);
                };
                self.check_roles(rule, user_id, roles, approval.as_ref())
                    .await
            }
            Protection::PermissionGated { permissions } => {
                let Some(user_id) = session.user_id() else {
                    return rule.deny(DenyReason::Unauthenticated);
                };
                self.check_permissions(rule, user_id, permissions).await
            }
        }
    }

    async fn check_roles(
        &self,
        rule: &RouteRule,
        user_id: &UserId,
        required: &BTreeSet<String>,
        approval: Option<&ApprovalGate>,
    ) -> Decision {
        let held = match self
            .with_retry("roles", rule, || self.lookups.roles.roles_for(user_id))
            .await
        {
            Ok(held) => held,
            Err(_) => return rule.deny(DenyReason::LookupFailed),
        };

        let granted: Vec<&String> = required.intersection(&held).collect();
        if granted.is_empty() {
            return rule.deny(DenyReason::MissingRole);
        }

        match approval {
            Some(gate) if granted.iter().all(|role| **role == gate.role) => {
                self.check_approval(rule, gate, user_id).await
            }
            _ => Decision::Allow,
        }
    }

    async fn check_approval(&self, rule: &RouteRule, gate: &ApprovalGate, user_id: &UserId) -> Decision {
        let not_approved = |reason| Decision::Redirect {
            target: gate.redirect_to.clone(),
            reason,
        };

        match self
            .with_retry("approval", rule, || {
                self.lookups.approvals.approval_status(user_id)
            })
            .await
        {
            Ok(Some(ApprovalStatus::Approved)) => Decision::Allow,
            Ok(status) => {
                tracing::debug!(user_id = %user_id, status = ?status, "Caller is not approved");
                not_approved(DenyReason::NotApproved)
            }
            Err(_) => not_approved(DenyReason::LookupFailed),
        }
    }

    async fn check_permissions(
        &self,
        rule: &RouteRule,
        user_id: &UserId,
        required: &BTreeSet<String>,
    ) -> Decision {
        match self
            .with_retry("permissions", rule, || {
                self.lookups.permissions.permissions_for(user_id)
            })
            .await
        {
            Ok(held) if !required.is_disjoint(&held) => Decision::Allow,
            Ok(_) => rule.deny(DenyReason::MissingPermission),
            Err(_) => rule.deny(DenyReason::LookupFailed),
        }
    }

    /// Run a lookup, retrying transient failures up to `lookup_retries` times.
    /// The final error is logged and counted here.
    async fn with_retry<T, F, Fut>(&self, lookup: &'static str, rule: &RouteRule, mut call: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let mut attempt: u8 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.lookup_retries => {
                    attempt += 1;
                    tracing::debug!(lookup, attempt, error = %err, "Directory lookup failed, retrying");
                    self.metrics.record_event(
                        GateEvent::LookupRetried,
                        &GateMetricLabels::default()
                            .with_rule(rule.to_string())
                            .with_lookup(lookup)
                            .with_error_type(err.kind()),
                    );
                }
                Err(err) => {
                    tracing::error!(
                        lookup,
                        rule = %rule,
                        error = %err,
                        "Directory lookup failed, denying request"
                    );
                    self.metrics.record_event(
                        GateEvent::LookupFailed,
                        &GateMetricLabels::default()
                            .with_rule(rule.to_string())
                            .with_lookup(lookup)
                            .with_error_type(err.kind()),
                    );
                    return Err(err);
                }
            }
        }
    }
}
