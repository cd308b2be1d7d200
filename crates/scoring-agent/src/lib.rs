pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod scorer;
pub mod status;
pub mod supervisor;
pub mod topology;

pub use crate::config::{AgentConfig, FailurePolicy};
pub use consumer::ResponseConsumer;
pub use error::{WorkerError, Result};
pub use publisher::RewardPublisher;
pub use scorer::{FixedScorer, Scorer};
pub use status::AgentStatus;
pub use supervisor::{ConsumerExit, Supervisor};
pub use topology::QueueTopology;
