mod error;
mod message;

pub use error::{MessageError, Result};
pub use message::{ResponseMessage, RewardMessage, RewardMetadata, TaskId, TIMESTAMP_FORMAT};
