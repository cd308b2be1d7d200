use crate::broker::{BrokerChannel, Delivery};
use crate::config::FailurePolicy;
use crate::error::{HandleError, ProcessingError, Result, WorkerError};
use crate::publisher::RewardPublisher;
use crate::scorer::Scorer;
use crate::status::AgentStatus;
use futures::StreamExt;
use scoring_core::{ResponseMessage, RewardMessage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// At most one unacknowledged response at a time
pub const PREFETCH_COUNT: u16 = 1;

/// How a delivery was settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued,
}

/// Consumes responses one at a time, scores them and publishes rewards
pub struct ResponseConsumer<C> {
    channel: C,
    response_queue: String,
    consumer_tag: String,
    publisher: RewardPublisher,
    scorer: Arc<dyn Scorer>,
    status: Arc<AgentStatus>,
    failure_policy: FailurePolicy,
}

impl<C: BrokerChannel> ResponseConsumer<C> {
    pub fn new(
        channel: C,
        response_queue: impl Into<String>,
        publisher: RewardPublisher,
        scorer: Arc<dyn Scorer>,
        status: Arc<AgentStatus>,
    ) -> Self {
        let consumer_tag = format!("{}-consumer", status.agent_id());

        ResponseConsumer {
            channel,
            response_queue: response_queue.into(),
            consumer_tag,
            publisher,
            scorer,
            status,
            failure_policy: FailurePolicy::Drop,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = consumer_tag.into();
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Subscribe with prefetch 1 and handle deliveries until `shutdown` is
    /// cancelled. Returns an error only for broker-level failures.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.channel
            .set_prefetch(PREFETCH_COUNT)
            .await
            .map_err(WorkerError::Consume)?;

        let mut deliveries = self
            .channel
            .consume(&self.response_queue, &self.consumer_tag)
            .await
            .map_err(WorkerError::Consume)?;

        info!(
            queue = %self.response_queue,
            consumer_tag = %self.consumer_tag,
            "Waiting for responses..."
        );

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Consumer shutting down");
                    return Ok(());
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.handle_delivery(delivery).await?;
                }
                Some(Err(e)) => return Err(WorkerError::Delivery(e)),
                None => {
                    warn!("Delivery stream closed by broker");
                    return Err(WorkerError::DeliveryStreamClosed);
                }
            }
        }
    }

    /// Process one delivery and settle it. Per-message failures are logged
    /// and never returned; only a failed ack/nack is.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<Settlement> {
        let metrics = self.status.metrics();
        metrics.responses_received.inc();
        let delivery_tag = delivery.delivery_tag;

        let requeue = match self.process(&delivery.body).await {
            Ok(reward) => {
                info!(
                    task_id = %reward.task_id,
                    delivery_tag,
                    score = reward.score,
                    "Sent reward"
                );
                false
            }
            Err(HandleError::Validation(e)) => {
                metrics.validation_failures.inc();
                error!(delivery_tag, "Failed to process response: {}", e);
                false
            }
            Err(HandleError::Processing(e)) => {
                metrics.processing_failures.inc();
                error!(delivery_tag, "Failed to process response: {}", e);
                // One redelivery at most, so a poison message cannot loop forever
                self.failure_policy == FailurePolicy::Requeue && !delivery.redelivered
            }
        };

        let settled = if requeue {
            self.channel.nack(delivery_tag, true).await
        } else {
            self.channel.ack(delivery_tag).await
        };
        settled.map_err(|source| WorkerError::Settle {
            delivery_tag,
            source,
        })?;

        debug!(delivery_tag, requeue, "Settled delivery");
        Ok(if requeue {
            Settlement::Requeued
        } else {
            Settlement::Acked
        })
    }

    async fn process(&self, body: &[u8]) -> std::result::Result<RewardMessage, HandleError> {
        let response = ResponseMessage::from_slice(body)?;
        info!(task_id = %response.task_id, "Received response");

        let score = self
            .scorer
            .score(&response)
            .await
            .map_err(ProcessingError::from)?;
        self.status.metrics().responses_scored.inc();

        let reward = RewardMessage::for_response(&response, score);
        self.publisher.publish(&self.channel, &reward).await?;
        self.status.metrics().rewards_sent.inc();

        Ok(reward)
    }
}
