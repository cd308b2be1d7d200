//! In-process broker with RabbitMQ-like queue semantics: durable declaration,
//! per-channel prefetch, ack/nack with requeue, and injectable connection
//! failures. Used by the test suite and for running the agent without RabbitMQ.

use super::{BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream};
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Something observable that happened inside the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Declared { queue: String },
    Subscribed { queue: String, consumer_tag: String },
    Published { queue: String },
    Delivered { queue: String, delivery_tag: u64 },
    Acked { delivery_tag: u64 },
    Nacked { delivery_tag: u64, requeue: bool },
}

#[derive(Debug, Clone)]
pub struct BrokerEvent {
    pub at: Instant,
    pub kind: EventKind,
}

#[derive(Default)]
struct QueueState {
    durable: bool,
    ready: VecDeque<(Vec<u8>, bool)>,
}

#[derive(Default)]
struct BrokerState {
    queues: Mutex<HashMap<String, QueueState>>,
    events: Mutex<Vec<BrokerEvent>>,
    notify: Notify,
    closed: AtomicBool,
    next_tag: AtomicU64,
    refusals_left: AtomicU32,
    connect_attempts: AtomicU32,
}

impl BrokerState {
    fn record(&self, kind: EventKind) {
        self.events.lock().push(BrokerEvent {
            at: Instant::now(),
            kind,
        });
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Handle to a shared in-memory broker; clones see the same queues
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            broker: self.clone(),
        }
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_connections(&self, n: u32) {
        self.state.refusals_left.store(n, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Put a message on `queue` as an external producer would, creating the
    /// queue if needed
    pub fn enqueue(&self, queue: &str, body: impl Into<Vec<u8>>) {
        self.state
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back((body.into(), false));
        self.state.notify.notify_waiters();
    }

    /// Ready (undelivered) messages on `queue`
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .queues
            .lock()
            .get(queue)
            .map(|q| q.ready.iter().map(|(body, _)| body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.state.queues.lock().get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn is_durable(&self, queue: &str) -> bool {
        self.state.queues.lock().get(queue).is_some_and(|q| q.durable)
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.state.events.lock().clone()
    }

    /// Shut the broker down; open delivery streams end and further
    /// operations fail
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Poll `condition` until it holds or `timeout` passes
    pub async fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&MemoryBroker) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if tokio::time::Instant::now() > deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub struct MemoryConnector {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn try_connect(&self) -> Result<MemoryConnection, BrokerError> {
        let state = &self.broker.state;
        state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        state.ensure_open()?;

        let refused = state
            .refusals_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BrokerError::Connection("connection refused".to_string()));
        }

        Ok(MemoryConnection {
            broker: self.broker.clone(),
        })
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }
}

pub struct MemoryConnection {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    type Channel = MemoryChannel;

    async fn create_channel(&self) -> Result<MemoryChannel, BrokerError> {
        self.broker.state.ensure_open()?;
        Ok(MemoryChannel {
            state: self.broker.state.clone(),
            prefetch: Arc::new(AtomicU16::new(0)),
            unacked: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

/// Channel on a [`MemoryBroker`]. Prefetch 0 means unlimited.
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<BrokerState>,
    prefetch: Arc<AtomicU16>,
    unacked: Arc<Mutex<HashMap<u64, (String, Vec<u8>)>>>,
}

impl MemoryChannel {
    fn try_deliver(&self, queue: &str) -> Option<Delivery> {
        let prefetch = self.prefetch.load(Ordering::SeqCst) as usize;
        let mut unacked = self.unacked.lock();
        if prefetch > 0 && unacked.len() >= prefetch {
            return None;
        }

        let mut queues = self.state.queues.lock();
        let (body, redelivered) = queues.get_mut(queue)?.ready.pop_front()?;
        let delivery_tag = self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        unacked.insert(delivery_tag, (queue.to_string(), body.clone()));

        self.state.record(EventKind::Delivered {
            queue: queue.to_string(),
            delivery_tag,
        });

        Some(Delivery {
            delivery_tag,
            body,
            redelivered,
        })
    }

    fn settle(&self, delivery_tag: u64) -> Result<(String, Vec<u8>), BrokerError> {
        self.state.ensure_open()?;
        self.unacked
            .lock()
            .remove(&delivery_tag)
            .ok_or_else(|| BrokerError::Channel(format!("unknown delivery tag {}", delivery_tag)))
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_durable_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.state.ensure_open()?;
        self.state
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .durable = true;
        self.state.record(EventKind::Declared {
            queue: queue.to_string(),
        });
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.state.ensure_open()?;
        self.prefetch.store(count, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        self.state.ensure_open()?;
        if !self.state.queues.lock().contains_key(queue) {
            return Err(BrokerError::Channel(format!("NOT_FOUND - no queue '{}'", queue)));
        }
        self.state.record(EventKind::Subscribed {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
        });

        let stream = futures::stream::unfold(
            (self.clone(), queue.to_string()),
            |(channel, queue)| async move {
                loop {
                    let state = channel.state.clone();
                    // Registered before checking so a wakeup between the
                    // check and the await is not lost.
                    let notified = state.notify.notified();

                    if state.closed.load(Ordering::SeqCst) {
                        return None;
                    }
                    if let Some(delivery) = channel.try_deliver(&queue) {
                        return Some((Ok::<_, BrokerError>(delivery), (channel, queue)));
                    }

                    notified.await;
                }
            },
        );

        Ok(stream.boxed())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.state.ensure_open()?;
        {
            // Like the AMQP default exchange, unroutable messages are dropped.
            let mut queues = self.state.queues.lock();
            if let Some(q) = queues.get_mut(queue) {
                q.ready.push_back((body, false));
            }
        }
        self.state.record(EventKind::Published {
            queue: queue.to_string(),
        });
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.settle(delivery_tag)?;
        self.state.record(EventKind::Acked { delivery_tag });
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let (queue, body) = self.settle(delivery_tag)?;
        if requeue {
            if let Some(q) = self.state.queues.lock().get_mut(&queue) {
                q.ready.push_front((body, true));
            }
        }
        self.state.record(EventKind::Nacked {
            delivery_tag,
            requeue,
        });
        self.state.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn channel(broker: &MemoryBroker) -> MemoryChannel {
        let connection = broker.connector().try_connect().await.unwrap();
        connection.create_channel().await.unwrap()
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let broker = MemoryBroker::new();
        broker.refuse_connections(2);
        let connector = broker.connector();

        assert!(connector.try_connect().await.is_err());
        assert!(connector.try_connect().await.is_err());
        assert!(connector.try_connect().await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_prefetch_holds_back_deliveries() {
        let broker = MemoryBroker::new();
        let channel = channel(&broker).await;
        channel.declare_durable_queue("q").await.unwrap();
        channel.set_prefetch(1).await.unwrap();
        broker.enqueue("q", b"one".to_vec());
        broker.enqueue("q", b"two".to_vec());

        let mut stream = channel.consume("q", "tag").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.body, b"one");

        let second = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(second.is_err(), "second delivery must wait for the first ack");

        channel.ack(first.delivery_tag).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.body, b"two");
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers() {
        let broker = MemoryBroker::new();
        let channel = channel(&broker).await;
        channel.declare_durable_queue("q").await.unwrap();
        broker.enqueue("q", b"payload".to_vec());

        let mut stream = channel.consume("q", "tag").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.redelivered);
        channel.nack(first.delivery_tag, true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered);
        assert_eq!(again.body, b"payload");
        assert_ne!(again.delivery_tag, first.delivery_tag);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_is_dropped() {
        let broker = MemoryBroker::new();
        let channel = channel(&broker).await;

        channel.publish("nowhere", b"x".to_vec()).await.unwrap();
        assert_eq!(broker.queue_len("nowhere"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let broker = MemoryBroker::new();
        let channel = channel(&broker).await;
        channel.declare_durable_queue("q").await.unwrap();
        let mut stream = channel.consume("q", "tag").await.unwrap();

        broker.close();
        assert!(stream.next().await.is_none());
        assert!(matches!(channel.ack(1).await, Err(BrokerError::Closed)));
    }
}
