use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Counters maintained by the consumer and read by the status server.
///
/// Backed by prometheus counters, which are atomic, so both contexts can
/// touch them without extra locking.
pub struct AgentMetrics {
    registry: Registry,

    pub responses_received: IntCounter,
    pub responses_scored: IntCounter,
    pub rewards_sent: IntCounter,
    pub validation_failures: IntCounter,
    pub processing_failures: IntCounter,
}

impl AgentMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let responses_received = IntCounter::new(
            "scoring_responses_received_total",
            "Response messages delivered to the consumer",
        )?;
        registry.register(Box::new(responses_received.clone()))?;

        let responses_scored = IntCounter::new(
            "scoring_responses_scored_total",
            "Valid responses the scorer produced a score for",
        )?;
        registry.register(Box::new(responses_scored.clone()))?;

        let rewards_sent = IntCounter::new(
            "scoring_rewards_sent_total",
            "Reward messages published to the reward queue",
        )?;
        registry.register(Box::new(rewards_sent.clone()))?;

        let validation_failures = IntCounter::new(
            "scoring_validation_failures_total",
            "Responses dropped because they were malformed",
        )?;
        registry.register(Box::new(validation_failures.clone()))?;

        let processing_failures = IntCounter::new(
            "scoring_processing_failures_total",
            "Responses whose scoring or publishing failed",
        )?;
        registry.register(Box::new(processing_failures.clone()))?;

        Ok(AgentMetrics {
            registry,
            responses_received,
            responses_scored,
            rewards_sent,
            validation_failures,
            processing_failures,
        })
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
