//! RabbitMQ implementation of the broker traits on top of `lapin`.

use super::{BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream};
use crate::config::AgentConfig;
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Connection, ConnectionProperties};

/// Connects to RabbitMQ with plain credentials on the default vhost
pub struct AmqpConnector {
    uri: AMQPUri,
}

impl AmqpConnector {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        let uri = AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                host: host.to_string(),
                port,
            },
            ..AMQPUri::default()
        };

        AmqpConnector { uri }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            &config.rabbitmq_host,
            config.rabbitmq_port,
            &config.rabbitmq_user,
            &config.rabbitmq_pass,
        )
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Connection = AmqpConnection;

    async fn try_connect(&self) -> Result<AmqpConnection, BrokerError> {
        let connection = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(AmqpConnection { inner: connection })
    }

    fn describe(&self) -> String {
        let authority = &self.uri.authority;
        format!(
            "amqp://{}@{}:{}",
            authority.userinfo.username, authority.host, authority.port
        )
    }
}

pub struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = AmqpChannel;

    async fn create_channel(&self) -> Result<AmqpChannel, BrokerError> {
        let channel = self.inner.create_channel().await?;
        Ok(AmqpChannel { inner: channel })
    }
}

pub struct AmqpChannel {
    inner: lapin::Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_durable_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.inner
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.inner
            .basic_qos(count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.map(|delivery| {
            delivery
                .map(|d| Delivery {
                    delivery_tag: d.delivery_tag,
                    body: d.data,
                    redelivered: d.redelivered,
                })
                .map_err(BrokerError::from)
        });

        Ok(stream.boxed())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        // The returned confirm is dropped: rewards are fire-and-forget.
        let _confirm = self
            .inner
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.inner
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let options = BasicNackOptions {
            requeue,
            ..BasicNackOptions::default()
        };
        self.inner.basic_nack(delivery_tag, options).await?;
        Ok(())
    }
}
