// Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use scoring_agent::broker::memory::{EventKind, MemoryBroker, MemoryChannel};
use scoring_agent::broker::BrokerConnector;
use scoring_agent::error::ScoringError;
use scoring_agent::{AgentConfig, AgentStatus, QueueTopology, ResponseConsumer, RewardPublisher, Scorer};
use scoring_core::ResponseMessage;
use std::sync::Arc;
use std::time::Duration;

pub const RESPONSES: &str = "response_queue";
pub const REWARDS: &str = "reward_queue";

/// Scorer that returns a fixed value, fails for one task id, and records
/// every task id it was asked about
pub struct ScriptedScorer {
    score: f64,
    fail_for: Option<String>,
    delay: Duration,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedScorer {
    pub fn new(score: f64) -> Self {
        ScriptedScorer {
            score,
            fail_for: None,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, task_id: &str) -> Self {
        self.fail_for = Some(task_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, response: &ResponseMessage) -> Result<f64, ScoringError> {
        self.seen.lock().push(response.task_id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_for.as_deref() == Some(response.task_id.as_str()) {
            return Err(ScoringError("scorer unavailable".to_string()));
        }
        Ok(self.score)
    }
}

pub async fn consumer(
    broker: &MemoryBroker,
    scorer: Arc<dyn Scorer>,
) -> (ResponseConsumer<MemoryChannel>, Arc<AgentStatus>) {
    let connection = broker.connector().try_connect().await.unwrap();
    let channel = QueueTopology::new(RESPONSES, REWARDS)
        .ensure(&connection)
        .await
        .unwrap();
    let status = Arc::new(AgentStatus::new("scoring_agent_test").unwrap());

    let consumer = ResponseConsumer::new(
        channel,
        RESPONSES,
        RewardPublisher::new(REWARDS),
        scorer,
        status.clone(),
    );
    (consumer, status)
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        agent_id: "scoring_agent_test".to_string(),
        status_host: "127.0.0.1".to_string(),
        status_port: 0,
        connect_max_attempts: 2,
        connect_retry_delay_ms: 10,
        ..AgentConfig::default()
    }
}

pub fn count_events(broker: &MemoryBroker, matches: impl Fn(&EventKind) -> bool) -> usize {
    broker.events().iter().filter(|e| matches(&e.kind)).count()
}

pub fn acks(broker: &MemoryBroker) -> usize {
    count_events(broker, |kind| matches!(kind, EventKind::Acked { .. }))
}

pub fn reward_json(broker: &MemoryBroker) -> Vec<serde_json::Value> {
    broker
        .messages(REWARDS)
        .iter()
        .map(|body| serde_json::from_slice(body).unwrap())
        .collect()
}
