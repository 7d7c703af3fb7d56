use crate::{
    config_error::ConfigError,
    policy::DEFAULT_LOOKUP_RETRIES,
    rule_table::RuleTable,
    types::{ApprovalGate, MatchKind, Protection, RouteRule},
};
use serde::{Deserialize, Serialize};

/// Route gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Ordered route table; the first matching rule decides
    #[serde(default = "default_rules")]
    pub rules: Vec<RouteRuleConfig>,

    /// Extra attempts for a Directory Store lookup that failed transiently
    #[serde(default = "default_lookup_retries")]
    pub lookup_retries: u8,
}

fn default_lookup_retries() -> u8 {
    DEFAULT_LOOKUP_RETRIES
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            lookup_retries: DEFAULT_LOOKUP_RETRIES,
        }
    }
}

impl GateConfig {
    /// Check the rules without keeping the table.
    ///
    /// # Errors
    ///
    /// Same as [`GateConfig::build_rule_table`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_rule_table().map(|_| ())
    }

    /// Validate the rules and build the immutable route table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for the first rule that is malformed or
    /// produces a redirect loop.
    pub fn build_rule_table(&self) -> Result<RuleTable, ConfigError> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| rule.to_rule(index))
            .collect::<Result<Vec<_>, _>>()?;
        let table = RuleTable::new(rules)?;
        table.warn_shadowed();

        tracing::info!(
            rules = table.len(),
            lookup_retries = self.lookup_retries,
            "Route table built"
        );
        Ok(table)
    }
}

/// Protection kinds as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionKind {
    Authenticated,
    Unauthenticated,
    #[serde(alias = "role")]
    RoleGated,
    #[serde(alias = "permission")]
    PermissionGated,
}

/// One route rule as written in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    pub pattern: String,

    #[serde(rename = "match", default)]
    pub match_kind: MatchKind,

    pub protection: ProtectionKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    pub redirect_to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalGate>,
}

impl RouteRuleConfig {
    fn to_rule(&self, index: usize) -> Result<RouteRule, ConfigError> {
        let reject = |reason: &str| Err(ConfigError::misconfigured(index, &self.pattern, reason));

        if self.protection != ProtectionKind::RoleGated {
            if !self.roles.is_empty() {
                return reject("roles are only allowed on role_gated rules");
            }
            if self.approval.is_some() {
                return reject("approval is only allowed on role_gated rules");
            }
        }
        if self.protection != ProtectionKind::PermissionGated && !self.permissions.is_empty() {
            return reject("permissions are only allowed on permission_gated rules");
        }

        let protection = match self.protection {
            ProtectionKind::Authenticated => Protection::Authenticated,
            ProtectionKind::Unauthenticated => Protection::Unauthenticated,
            ProtectionKind::RoleGated => Protection::RoleGated {
                roles: self.roles.iter().cloned().collect(),
                approval: self.approval.clone(),
            },
            ProtectionKind::PermissionGated => Protection::permissions(self.permissions.iter().cloned()),
        };

        Ok(RouteRule {
            pattern: self.pattern.clone(),
            match_kind: self.match_kind,
            protection,
            redirect_to: self.redirect_to.clone(),
        })
    }
}

fn rule(
    pattern: &str,
    match_kind: MatchKind,
    protection: ProtectionKind,
    roles: &[&str],
    redirect_to: &str,
) -> RouteRuleConfig {
    RouteRuleConfig {
        pattern: pattern.to_owned(),
        match_kind,
        protection,
        roles: roles.iter().map(|r| (*r).to_owned()).collect(),
        permissions: Vec::new(),
        redirect_to: redirect_to.to_owned(),
        approval: None,
    }
}

/// The shop's route table
fn default_rules() -> Vec<RouteRuleConfig> {
    let mut barber = rule(
        "/barber",
        MatchKind::Prefix,
        ProtectionKind::RoleGated,
        &["barber", "admin"],
        "/unauthorized",
    );
    barber.approval = Some(ApprovalGate {
        role: "barber".to_owned(),
        redirect_to: "/pending-approval".to_owned(),
    });

    vec![
        rule("/protected", MatchKind::Prefix, ProtectionKind::Authenticated, &[], "/sign-in"),
        barber,
        rule("/admin", MatchKind::Prefix, ProtectionKind::RoleGated, &["admin"], "/unauthorized"),
        rule(
            "/bookings/manage",
            MatchKind::Prefix,
            ProtectionKind::RoleGated,
            &["staff", "admin"],
            "/unauthorized",
        ),
        rule("/sign-in", MatchKind::Exact, ProtectionKind::Unauthenticated, &[], "/protected"),
        rule("/sign-up", MatchKind::Exact, ProtectionKind::Unauthenticated, &[], "/protected"),
    ]
}
