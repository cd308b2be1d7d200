use crate::broker::BrokerChannel;
use crate::error::ProcessingError;
use scoring_core::RewardMessage;
use tracing::debug;

/// Serializes rewards and sends them to the reward queue
#[derive(Debug, Clone)]
pub struct RewardPublisher {
    reward_queue: String,
}

impl RewardPublisher {
    pub fn new(reward_queue: impl Into<String>) -> Self {
        RewardPublisher {
            reward_queue: reward_queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.reward_queue
    }

    /// Publish without confirmation; a broker outage after this returns can
    /// lose the reward.
    pub async fn publish<C: BrokerChannel>(
        &self,
        channel: &C,
        reward: &RewardMessage,
    ) -> Result<(), ProcessingError> {
        let body = reward.to_vec().map_err(ProcessingError::Encode)?;
        channel
            .publish(&self.reward_queue, body)
            .await
            .map_err(ProcessingError::Publish)?;

        debug!(task_id = %reward.task_id, queue = %self.reward_queue, "Published reward");
        Ok(())
    }
}
