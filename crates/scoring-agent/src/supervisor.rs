use crate::api;
use crate::broker::{BrokerConnector, RetryingConnector};
use crate::config::AgentConfig;
use crate::consumer::ResponseConsumer;
use crate::error::Result;
use crate::publisher::RewardPublisher;
use crate::scorer::Scorer;
use crate::status::{AgentStatus, ConsumerHealth};
use crate::topology::QueueTopology;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit code for a normal shutdown
pub const EXIT_OK: u8 = 0;

/// Exit code when the consumer died during the process lifetime
pub const EXIT_CONSUMER_FAILED: u8 = 2;

/// How the consumer context ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    Shutdown,
    Failed(String),
}

impl ConsumerExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            ConsumerExit::Shutdown => EXIT_OK,
            ConsumerExit::Failed(_) => EXIT_CONSUMER_FAILED,
        }
    }
}

/// Runs the consumer and the status server as two independent tasks.
///
/// A consumer failure is logged and recorded in [`AgentStatus`]; it is not
/// restarted and the status server keeps serving. With
/// `exit_on_consumer_failure` set, the failure also triggers shutdown.
pub struct Supervisor<K> {
    config: AgentConfig,
    connector: Arc<RetryingConnector<K>>,
    scorer: Arc<dyn Scorer>,
    status: Arc<AgentStatus>,
}

impl<K> Supervisor<K>
where
    K: BrokerConnector + 'static,
{
    pub fn new(
        config: AgentConfig,
        connector: K,
        scorer: Arc<dyn Scorer>,
        status: Arc<AgentStatus>,
    ) -> Self {
        let connector = RetryingConnector::new(
            connector,
            config.connect_max_attempts,
            config.retry_delay(),
        );

        Supervisor {
            config,
            connector: Arc::new(connector),
            scorer,
            status,
        }
    }

    pub fn connector(&self) -> Arc<RetryingConnector<K>> {
        self.connector.clone()
    }

    /// Bind the status listener and spawn both contexts
    pub async fn start(self) -> Result<SupervisorHandle> {
        let shutdown = CancellationToken::new();

        let listener = TcpListener::bind(self.config.status_addr()).await?;
        let status_addr = listener.local_addr()?;
        info!("Status server listening on {}", status_addr);

        let server = tokio::spawn(api::serve(listener, self.status.clone(), shutdown.clone()));

        let exit_on_failure = self.config.exit_on_consumer_failure;
        let status = self.status.clone();
        let token = shutdown.clone();
        let consumer_task = tokio::spawn(run_consumer(
            self.config,
            self.connector,
            self.scorer,
            self.status,
            shutdown.clone(),
        ));

        let consumer = tokio::spawn(async move {
            let exit = match consumer_task.await {
                Ok(Ok(())) => {
                    status.set_consumer_health(ConsumerHealth::Stopped);
                    ConsumerExit::Shutdown
                }
                Ok(Err(e)) => {
                    error!("Consumer loop crashed: {}", e);
                    ConsumerExit::Failed(e.to_string())
                }
                Err(e) if e.is_panic() => {
                    error!("Consumer loop panicked: {:?}", e);
                    ConsumerExit::Failed("consumer panicked".to_string())
                }
                Err(_) => ConsumerExit::Failed("consumer was cancelled".to_string()),
            };

            if let ConsumerExit::Failed(reason) = &exit {
                status.set_consumer_health(ConsumerHealth::Failed(reason.clone()));
                if exit_on_failure {
                    warn!("Shutting down after consumer failure");
                    token.cancel();
                } else {
                    warn!("Consumer is down; status server keeps running");
                }
            }

            exit
        });

        Ok(SupervisorHandle {
            status_addr,
            shutdown,
            consumer,
            server,
        })
    }
}

async fn run_consumer<K: BrokerConnector>(
    config: AgentConfig,
    connector: Arc<RetryingConnector<K>>,
    scorer: Arc<dyn Scorer>,
    status: Arc<AgentStatus>,
    shutdown: CancellationToken,
) -> Result<()> {
    let connection = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        connection = connector.connect() => connection?,
    };

    let topology = QueueTopology::new(config.response_queue.clone(), config.reward_queue.clone());
    let channel = topology.ensure(&connection).await?;

    let consumer = ResponseConsumer::new(
        channel,
        topology.response_queue.clone(),
        RewardPublisher::new(topology.reward_queue.clone()),
        scorer,
        status.clone(),
    )
    .with_failure_policy(config.failure_policy)
    .with_consumer_tag(config.consumer_tag());

    status.set_consumer_health(ConsumerHealth::Consuming);
    let result = consumer.run(shutdown).await;

    // The connection must outlive the channel the consumer used
    drop(consumer);
    drop(connection);
    result
}

/// Handle to the running contexts
pub struct SupervisorHandle {
    status_addr: SocketAddr,
    shutdown: CancellationToken,
    consumer: JoinHandle<ConsumerExit>,
    server: JoinHandle<std::io::Result<()>>,
}

impl SupervisorHandle {
    pub fn status_addr(&self) -> SocketAddr {
        self.status_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal both contexts to stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for shutdown to be signalled, then for both contexts to finish
    pub async fn join(self) -> ConsumerExit {
        self.shutdown.cancelled().await;

        let exit = match self.consumer.await {
            Ok(exit) => exit,
            Err(e) => ConsumerExit::Failed(format!("consumer supervisor failed: {}", e)),
        };

        match self.server.await {
            Ok(Ok(())) => info!("Status server stopped"),
            Ok(Err(e)) => error!("Status server error: {}", e),
            Err(e) => error!("Status server task failed: {}", e),
        }

        exit
    }
}
