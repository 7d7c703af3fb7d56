#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

// Core modules
pub mod errors;
pub mod traits;
pub mod types;

pub mod policy;
pub mod rule_table;
pub mod session;

pub mod config;
pub mod config_error;
pub mod metrics;

#[cfg(feature = "axum-ext")]
pub mod axum_ext;

// Core exports
pub use errors::{AuthServiceError, GateError, LookupError};
pub use traits::{
    ApprovalLookup, ApprovalStatus, AuthLookup, AuthService, DirectoryLookups, PermissionLookup,
    RoleLookup,
};
pub use types::{
    ApprovalGate, Decision, DenyReason, MatchKind, Protection, RouteRule, SessionContext, UserId,
};

// Engine exports
pub use policy::RoutePolicyEngine;
pub use rule_table::{RuleTable, ShadowedRule};
pub use session::{ResolvedSession, SessionResolver};

// Configuration exports
pub use config::{GateConfig, ProtectionKind, RouteRuleConfig};
pub use config_error::ConfigError;
pub use metrics::{GateEvent, GateMetricLabels, GateMetrics, LoggingMetrics, NoOpMetrics};
