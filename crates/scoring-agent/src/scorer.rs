use crate::error::ScoringError;
use async_trait::async_trait;
use scoring_core::ResponseMessage;

/// Computes the reward score for a task response
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, response: &ResponseMessage) -> Result<f64, ScoringError>;
}

/// Scores every response with the same constant
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer {
    score: f64,
}

impl FixedScorer {
    pub fn new(score: f64) -> Self {
        FixedScorer { score }
    }
}

impl Default for FixedScorer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _response: &ResponseMessage) -> Result<f64, ScoringError> {
        Ok(self.score)
    }
}
