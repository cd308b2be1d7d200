use crate::broker::{BrokerChannel, BrokerConnection};
use crate::error::{Result, WorkerError};
use tracing::info;

/// The two durable queues the agent reads from and writes to
#[derive(Debug, Clone)]
pub struct QueueTopology {
    pub response_queue: String,
    pub reward_queue: String,
}

impl QueueTopology {
    pub fn new(response_queue: impl Into<String>, reward_queue: impl Into<String>) -> Self {
        QueueTopology {
            response_queue: response_queue.into(),
            reward_queue: reward_queue.into(),
        }
    }

    /// Open a channel on `connection` and declare both queues as durable.
    /// Safe to repeat on every startup.
    pub async fn ensure<C: BrokerConnection>(&self, connection: &C) -> Result<C::Channel> {
        let channel = connection
            .create_channel()
            .await
            .map_err(WorkerError::Topology)?;

        for queue in [&self.response_queue, &self.reward_queue] {
            channel
                .declare_durable_queue(queue)
                .await
                .map_err(WorkerError::Topology)?;
            info!(queue = %queue, "Declared durable queue");
        }

        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::BrokerConnector;

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let broker = MemoryBroker::new();
        broker.enqueue("responses", b"{\"task_id\": \"T\"}".to_vec());
        let connection = broker.connector().try_connect().await.unwrap();
        let topology = QueueTopology::new("responses", "rewards");

        topology.ensure(&connection).await.unwrap();
        topology.ensure(&connection).await.unwrap();

        assert!(broker.is_durable("responses"));
        assert!(broker.is_durable("rewards"));
        // Redeclaring must not touch messages already waiting
        assert_eq!(broker.queue_len("responses"), 1);
    }

    #[tokio::test]
    async fn test_ensure_propagates_broker_failure() {
        let broker = MemoryBroker::new();
        let connection = broker.connector().try_connect().await.unwrap();
        broker.close();

        let result = QueueTopology::new("responses", "rewards").ensure(&connection).await;
        assert!(matches!(result, Err(WorkerError::Topology(_))));
    }
}
