use crate::metrics::AgentMetrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// State of the consumer context as last reported by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerHealth {
    Starting,
    Consuming,
    Stopped,
    Failed(String),
}

/// Process-wide status shared between the consumer and the status server
pub struct AgentStatus {
    agent_id: String,
    started_at: DateTime<Utc>,
    metrics: AgentMetrics,
    consumer: RwLock<ConsumerHealth>,
}

impl AgentStatus {
    pub fn new(agent_id: impl Into<String>) -> prometheus::Result<Self> {
        Ok(AgentStatus {
            agent_id: agent_id.into(),
            started_at: Utc::now(),
            metrics: AgentMetrics::new()?,
            consumer: RwLock::new(ConsumerHealth::Starting),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn consumer_health(&self) -> ConsumerHealth {
        self.consumer.read().clone()
    }

    pub fn set_consumer_health(&self, health: ConsumerHealth) {
        *self.consumer.write() = health;
    }
}
