//! Metrics tracking for gate events
//!
//! Trait-based so a deployment can plug in Prometheus, StatsD, etc.

/// Gate event types for metrics tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// Request passed the gate
    Allowed,

    /// Request was redirected by a rule
    Redirected,

    /// Auth Service call failed; caller treated as signed out
    SessionResolveFailed,

    /// Auth Service rotated the session cookies
    SessionRefreshed,

    /// Directory Store lookup failed after retries
    LookupFailed,

    /// Directory Store lookup failed transiently and was retried
    LookupRetried,
}

impl GateEvent {
    /// Get the metric name for this event
    #[must_use]
    pub fn metric_name(&self) -> &'static str {
        match self {
            GateEvent::Allowed => "gate.decision.allow",
            GateEvent::Redirected => "gate.decision.redirect",
            GateEvent::SessionResolveFailed => "gate.session.resolve.fail",
            GateEvent::SessionRefreshed => "gate.session.refresh",
            GateEvent::LookupFailed => "gate.lookup.fail",
            GateEvent::LookupRetried => "gate.lookup.retry",
        }
    }
}

/// Labels for gate metrics
#[derive(Default, Debug, Clone)]
pub struct GateMetricLabels {
    /// Matched rule, rendered as `^/admin (role)`
    pub rule: Option<String>,

    /// Deny reason for redirects
    pub reason: Option<String>,

    /// Which lookup ran ("roles", "permissions", "approval")
    pub lookup: Option<String>,

    /// Error type (for failures)
    pub error_type: Option<String>,
}

impl GateMetricLabels {
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.lookup = Some(lookup.into());
        self
    }

    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

/// Trait for metrics backends
pub trait GateMetrics: Send + Sync {
    /// Record a gate event
    fn record_event(&self, event: GateEvent, labels: &GateMetricLabels);

    /// Record how long one gate evaluation took, lookups included
    fn record_duration(&self, duration_ms: u64, labels: &GateMetricLabels);
}

/// No-op metrics implementation (default)
#[derive(Debug, Clone, Copy)]
pub struct NoOpMetrics;

impl GateMetrics for NoOpMetrics {
    fn record_event(&self, _event: GateEvent, _labels: &GateMetricLabels) {
        // No-op
    }

    fn record_duration(&self, _duration_ms: u64, _labels: &GateMetricLabels) {
        // No-op
    }
}

/// Logging-based metrics implementation (for debugging)
#[derive(Debug, Clone, Copy)]
pub struct LoggingMetrics;

impl GateMetrics for LoggingMetrics {
    fn record_event(&self, event: GateEvent, labels: &GateMetricLabels) {
        tracing::debug!(
            metric = event.metric_name(),
            rule = ?labels.rule,
            reason = ?labels.reason,
            lookup = ?labels.lookup,
            error_type = ?labels.error_type,
            "Gate event recorded"
        );
    }

    fn record_duration(&self, duration_ms: u64, labels: &GateMetricLabels) {
        tracing::debug!(
            metric = "gate.decision.duration_ms",
            duration_ms = duration_ms,
            rule = ?labels.rule,
            "Gate decision duration recorded"
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_gate_event_metric_names() {
        assert_eq!(GateEvent::Allowed.metric_name(), "gate.decision.allow");
        assert_eq!(GateEvent::Redirected.metric_name(), "gate.decision.redirect");
        assert_eq!(
            GateEvent::SessionResolveFailed.metric_name(),
            "gate.session.resolve.fail"
        );
        assert_eq!(GateEvent::LookupRetried.metric_name(), "gate.lookup.retry");
    }

    #[test]
    fn test_metric_labels_builder() {
        let labels = GateMetricLabels::default()
            .with_rule("^/admin (role)")
            .with_reason("missing_role")
            .with_lookup("roles");

        assert_eq!(labels.rule, Some("^/admin (role)".to_owned()));
        assert_eq!(labels.reason, Some("missing_role".to_owned()));
        assert_eq!(labels.lookup, Some("roles".to_owned()));
        assert_eq!(labels.error_type, None);
    }

    #[test]
    fn test_noop_and_logging_metrics() {
        let labels = GateMetricLabels::default().with_error_type("unavailable");

        // Should not panic
        NoOpMetrics.record_event(GateEvent::LookupFailed, &labels);
        NoOpMetrics.record_duration(3, &labels);
        LoggingMetrics.record_event(GateEvent::LookupFailed, &labels);
        LoggingMetrics.record_duration(3, &labels);
    }
}
