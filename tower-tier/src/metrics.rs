use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;

use crate::decision::RateLimitDecision;

#[derive(Clone, Debug)]
pub(crate) struct GatewayMetrics {
    decisions: Counter<u64>,
}

impl GatewayMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("admission_gateway");
        Self {
            decisions: meter.u64_counter("admission_decisions").build(),
        }
    }

    pub(crate) fn record(&self, decision: &RateLimitDecision) {
        self.decisions.add(
            1,
            &[
                KeyValue::new("outcome", decision.outcome.as_str()),
                KeyValue::new("tier", decision.tier.as_str()),
            ],
        );
    }
}
