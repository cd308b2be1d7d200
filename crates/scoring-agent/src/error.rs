use scoring_core::MessageError;
use thiserror::Error;

/// Failure reported by the message broker or its client library
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Broker closed the connection")]
    Closed,
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(e) => BrokerError::Connection(e.to_string()),
            lapin::Error::InvalidConnectionState(_) => BrokerError::Closed,
            other => BrokerError::Channel(other.to_string()),
        }
    }
}

/// Failure raised by a scoring collaborator
#[derive(Error, Debug)]
#[error("Scoring failed: {0}")]
pub struct ScoringError(pub String);

/// Internal failure while turning a valid response into a delivered reward
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Failed to encode reward: {0}")]
    Encode(#[source] MessageError),

    #[error("Failed to publish reward: {0}")]
    Publish(#[source] BrokerError),
}

/// Outcome of handling a single delivery that did not produce a reward.
///
/// Validation failures are bad input and are always dropped; processing
/// failures follow the configured [`FailurePolicy`](crate::config::FailurePolicy).
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Invalid response: {0}")]
    Validation(#[from] MessageError),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),
}

impl HandleError {
    pub fn kind(&self) -> &'static str {
        match self {
            HandleError::Validation(_) => "validation",
            HandleError::Processing(_) => "processing",
        }
    }
}

/// Errors that end the consumer context
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Could not connect to broker after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: BrokerError },

    #[error("Queue setup failed: {0}")]
    Topology(#[source] BrokerError),

    #[error("Failed to start consuming: {0}")]
    Consume(#[source] BrokerError),

    #[error("Failed to settle delivery {delivery_tag}: {source}")]
    Settle {
        delivery_tag: u64,
        #[source]
        source: BrokerError,
    },

    #[error("Delivery stream failed: {0}")]
    Delivery(#[source] BrokerError),

    #[error("Delivery stream closed by broker")]
    DeliveryStreamClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
