use metrics::{counter, Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// Collected metrics for the sponsorship gateway.
#[derive(Metrics)]
#[metrics(scope = "sponsor_gateway")]
pub struct Metrics {
    /// Count of operations authorized for sponsorship.
    #[metric(describe = "Count of operations authorized for sponsorship")]
    pub accepted_operations: Counter,

    /// Count of operations denied sponsorship.
    #[metric(describe = "Count of operations denied sponsorship")]
    pub denied_operations: Counter,

    /// Count of requests denied by the per-actor rate limit.
    #[metric(describe = "Count of requests denied by the per-actor rate limit")]
    pub rate_limited_requests: Counter,

    /// Count of requests without a usable session.
    #[metric(describe = "Count of requests without a usable session")]
    pub unauthorized_requests: Counter,

    /// Count of requests for methods outside the permitted set.
    #[metric(describe = "Count of requests for methods outside the permitted set")]
    pub unknown_method_requests: Counter,

    /// Count of read-only chain queries that failed.
    #[metric(describe = "Count of read-only chain queries that failed")]
    pub chain_read_failures: Counter,

    /// Count of forwarding attempts that failed at the transport level.
    #[metric(describe = "Count of forwarding attempts that failed at the transport level")]
    pub upstream_errors: Counter,

    /// Duration of authorization decisions.
    #[metric(describe = "Duration of authorization decisions")]
    pub decision_duration: Histogram,

    /// Number of requests currently being processed.
    #[metric(describe = "Number of requests currently being processed")]
    pub inflight_requests: Gauge,
}

impl Metrics {
    /// Records a denial under its reason tag.
    pub fn denied_by_reason(&self, reason: &str) {
        counter!("sponsor_gateway.denials_by_reason", "reason" => reason.to_owned()).increment(1);
    }

    /// Records an accepted operation under its intent class.
    pub fn accepted_by_intent(&self, intent: &str) {
        counter!("sponsor_gateway.accepted_by_intent", "intent" => intent.to_owned()).increment(1);
    }
}
