use super::BrokerConnector;
use crate::error::{BrokerError, Result, WorkerError};
use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn, error};

/// Lifecycle of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget exhausted; terminal
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connects with a bounded number of attempts and a fixed delay between them
pub struct RetryingConnector<C> {
    inner: C,
    max_attempts: u32,
    delay: Duration,
    state: RwLock<ConnectionState>,
    history: RwLock<Vec<ConnectionState>>,
}

impl<C: BrokerConnector> RetryingConnector<C> {
    pub fn new(inner: C, max_attempts: u32, delay: Duration) -> Self {
        RetryingConnector {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
            state: RwLock::new(ConnectionState::Disconnected),
            history: RwLock::new(vec![ConnectionState::Disconnected]),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Every state the connector has passed through, oldest first
    pub fn history(&self) -> Vec<ConnectionState> {
        self.history.read().clone()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn transition(&self, next: ConnectionState) {
        *self.state.write() = next;
        self.history.write().push(next);
    }

    /// Try to connect up to `max_attempts` times, sleeping `delay` between attempts.
    pub async fn connect(&self) -> Result<C::Connection> {
        let target = self.inner.describe();
        let mut last_error = BrokerError::Connection("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            self.transition(ConnectionState::Connecting);
            info!(attempt, max_attempts = self.max_attempts, "Connecting to broker at {}", target);

            match self.inner.try_connect().await {
                Ok(connection) => {
                    self.transition(ConnectionState::Connected);
                    info!(attempt, "Connected to broker at {}", target);
                    return Ok(connection);
                }
                Err(e) => {
                    self.transition(ConnectionState::Disconnected);
                    warn!(attempt, "Connection to broker failed: {}", e);
                    last_error = e;
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.transition(ConnectionState::Failed);
        error!(
            attempts = self.max_attempts,
            "Could not connect to broker at {} after retries", target
        );

        Err(WorkerError::ConnectionExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
