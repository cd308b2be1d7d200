use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Malformed response payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Response message missing task_id")]
    MissingTaskId,

    #[error("Response message has an empty task_id")]
    EmptyTaskId,

    #[error("Reward score must be a finite number (got {0})")]
    NonFiniteScore(f64),
}

pub type Result<T> = std::result::Result<T, MessageError>;
