//! Validated, ordered route table.
//!
//! A [`RuleTable`] can only be built from rules that pass validation, so the
//! policy engine never sees an empty role set or a redirect chain that sends a
//! denied caller around in a cycle.

use crate::{
    config_error::ConfigError,
    types::{Protection, RouteRule},
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Ordered rules, immutable after construction. First match wins.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Arc<[RouteRule]>,
}

/// A rule that no path can reach because an earlier rule matches all of its paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowedRule {
    pub index: usize,
    pub shadowed_by: usize,
}

impl RuleTable {
    /// Validate `rules` and freeze them in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MisconfiguredRule`] for malformed rules and
    /// [`ConfigError::RedirectLoop`] when following the redirects for a denied
    /// caller ends up back at a rule already visited.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, ConfigError> {
        for (index, rule) in rules.iter().enumerate() {
            validate_rule(index, rule)?;
        }
        for (index, rule) in rules.iter().enumerate() {
            check_redirects(&rules, index, rule)?;
        }
        Ok(Self {
            rules: rules.into(),
        })
    }

    /// Table with no rules: every path is public
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Arc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule matching `path`, with its position
    #[must_use]
    pub fn first_match(&self, path: &str) -> Option<(usize, &RouteRule)> {
        first_match(&self.rules, path)
    }

    /// Rules that can never match because an earlier rule covers them
    #[must_use]
    pub fn shadowed_rules(&self) -> Vec<ShadowedRule> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| {
                self.rules[..index]
                    .iter()
                    .position(|earlier| rule.is_covered_by(earlier))
                    .map(|shadowed_by| ShadowedRule { index, shadowed_by })
            })
            .collect()
    }

    /// Log shadowed rules. They are dead configuration, not an error.
    pub fn warn_shadowed(&self) {
        for ShadowedRule { index, shadowed_by } in self.shadowed_rules() {
            tracing::warn!(
                rule = %self.rules[index],
                index,
                shadowed_by = %self.rules[shadowed_by],
                shadowed_by_index = shadowed_by,
                "Route rule can never match: an earlier rule covers every path it matches"
            );
        }
    }
}

fn first_match<'a>(rules: &'a [RouteRule], path: &str) -> Option<(usize, &'a RouteRule)> {
    rules.iter().enumerate().find(|(_, rule)| rule.matches(path))
}

fn validate_path(index: usize, rule: &RouteRule, what: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::misconfigured(
            index,
            &rule.pattern,
            format!("{what} must be an absolute path, got '{value}'"),
        ));
    }
    if http::HeaderValue::from_str(value).is_err() {
        return Err(ConfigError::misconfigured(
            index,
            &rule.pattern,
            format!("{what} is not a valid Location header value: {value:?}"),
        ));
    }
    Ok(())
}

fn validate_rule(index: usize, rule: &RouteRule) -> Result<(), ConfigError> {
    validate_path(index, rule, "pattern", &rule.pattern)?;
    validate_path(index, rule, "redirect target", &rule.redirect_to)?;

    match &rule.protection {
        Protection::RoleGated { roles, approval } => {
            if roles.is_empty() || roles.iter().any(|r| r.trim().is_empty()) {
                return Err(ConfigError::misconfigured(
                    index,
                    &rule.pattern,
                    "role-gated rule needs at least one non-empty role",
                ));
            }
            if let Some(gate) = approval {
                if !roles.contains(&gate.role) {
                    return Err(ConfigError::misconfigured(
                        index,
                        &rule.pattern,
                        format!("approval role '{}' is not one of the required roles", gate.role),
                    ));
                }
                validate_path(index, rule, "approval redirect target", &gate.redirect_to)?;
            }
        }
        Protection::PermissionGated { permissions } => {
            if permissions.is_empty() || permissions.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::misconfigured(
                    index,
                    &rule.pattern,
                    "permission-gated rule needs at least one non-empty permission",
                ));
            }
        }
        Protection::Authenticated | Protection::Unauthenticated => {}
    }
    Ok(())
}

/// What the validator knows about a caller that some rule turned away
#[derive(Clone)]
enum Caller<'a> {
    SignedOut,
    SignedIn {
        lacks_roles: &'a BTreeSet<String>,
        lacks_permissions: &'a BTreeSet<String>,
        unapproved: Option<&'a str>,
    },
}

/// Where `rule` certainly sends `caller`, or `None` if it may let them through
fn certain_redirect<'r>(rule: &'r RouteRule, caller: &Caller<'_>) -> Option<&'r str> {
    let Caller::SignedIn {
        lacks_roles,
        lacks_permissions,
        unapproved,
    } = caller
    else {
        return rule
            .protection
            .requires_session()
            .then_some(rule.redirect_to.as_str());
    };

    match &rule.protection {
        Protection::Authenticated => None,
        Protection::Unauthenticated => Some(rule.redirect_to.as_str()),
        Protection::RoleGated { roles, approval } => {
            if roles.is_subset(lacks_roles) {
                return Some(rule.redirect_to.as_str());
            }
            let gate = approval.as_ref()?;
            let only_gate_role = roles
                .iter()
                .all(|r| *r == gate.role || lacks_roles.contains(r));
            (*unapproved == Some(gate.role.as_str()) && only_gate_role)
                .then_some(gate.redirect_to.as_str())
        }
        Protection::PermissionGated { permissions } => permissions
            .is_subset(lacks_permissions)
            .then_some(rule.redirect_to.as_str()),
    }
}

fn strip_query(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

/// Follow the redirect chain of every caller class `rule` denies and fail on a cycle.
fn check_redirects(rules: &[RouteRule], index: usize, rule: &RouteRule) -> Result<(), ConfigError> {
    let none = BTreeSet::new();
    // An unapproved caller passed the role check through the gate role alone.
    let other_roles: BTreeSet<String> = match &rule.protection {
        Protection::RoleGated {
            roles,
            approval: Some(gate),
        } => roles.iter().filter(|r| **r != gate.role).cloned().collect(),
        _ => BTreeSet::new(),
    };
    let denied: Vec<(&str, Caller<'_>)> = match &rule.protection {
        Protection::Authenticated => vec![(rule.redirect_to.as_str(), Caller::SignedOut)],
        Protection::Unauthenticated => vec![(
            rule.redirect_to.as_str(),
            Caller::SignedIn {
                lacks_roles: &none,
                lacks_permissions: &none,
                unapproved: None,
            },
        )],
        Protection::RoleGated { roles, approval } => {
            let mut denied = vec![
                (rule.redirect_to.as_str(), Caller::SignedOut),
                (
                    rule.redirect_to.as_str(),
                    Caller::SignedIn {
                        lacks_roles: roles,
                        lacks_permissions: &none,
                        unapproved: None,
                    },
                ),
            ];
            if let Some(gate) = approval {
                denied.push((
                    gate.redirect_to.as_str(),
                    Caller::SignedIn {
                        lacks_roles: &other_roles,
                        lacks_permissions: &none,
                        unapproved: Some(gate.role.as_str()),
                    },
                ));
            }
            denied
        }
        Protection::PermissionGated { permissions } => vec![
            (rule.redirect_to.as_str(), Caller::SignedOut),
            (
                rule.redirect_to.as_str(),
                Caller::SignedIn {
                    lacks_roles: &none,
                    lacks_permissions: permissions,
                    unapproved: None,
                },
            ),
        ],
    };

    for (target, caller) in denied {
        let mut visited: Vec<usize> = Vec::new();
        let mut next = strip_query(target);
        while let Some((hop_index, hop_rule)) = first_match(rules, next) {
            if visited.contains(&hop_index) {
                return Err(ConfigError::RedirectLoop {
                    index,
                    pattern: rule.pattern.clone(),
                    target: target.to_owned(),
                    target_index: hop_index,
                    target_pattern: hop_rule.pattern.clone(),
                });
            }
            visited.push(hop_index);
            let Some(redirect) = certain_redirect(hop_rule, &caller) else {
                break;
            };
            next = strip_query(redirect);
        }
    }
    Ok(())
}
