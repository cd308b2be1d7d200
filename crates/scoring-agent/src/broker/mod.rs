//! Broker abstraction.
//!
//! The agent talks to the broker through three small traits so the consumer
//! loop can run against RabbitMQ ([`amqp`]) or the in-process broker used in
//! tests and local runs ([`memory`]).

pub mod amqp;
pub mod connector;
pub mod memory;

use crate::error::BrokerError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use connector::{ConnectionState, RetryingConnector};

/// A message handed to the consumer, identified by its delivery tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Opens connections to a broker. One call is one connection attempt.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    type Connection: BrokerConnection;

    async fn try_connect(&self) -> Result<Self::Connection, BrokerError>;

    /// Human readable target, used in log lines
    fn describe(&self) -> String;
}

/// Long-lived broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn create_channel(&self) -> Result<Self::Channel, BrokerError>;
}

/// Session on a connection; all queue operations go through it
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare a durable queue. Repeating the declaration is a no-op.
    async fn declare_durable_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Limit the number of unacknowledged deliveries on this channel
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError>;

    /// Publish without waiting for a broker confirmation
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}
