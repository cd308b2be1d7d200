// Integration tests for connection retry

use scoring_agent::broker::memory::MemoryBroker;
use scoring_agent::broker::{ConnectionState, RetryingConnector};
use scoring_agent::WorkerError;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_exhausts_after_max_attempts() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(u32::MAX);
    let connector = RetryingConnector::new(broker.connector(), 3, Duration::from_millis(10));

    let result = connector.connect().await;

    match result {
        Err(WorkerError::ConnectionExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        Err(other) => panic!("Expected ConnectionExhausted, got {:?}", other),
        Ok(_) => panic!("Expected ConnectionExhausted, got a connection"),
    }
    assert_eq!(broker.connect_attempts(), 3);
    assert_eq!(connector.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_succeeds_on_second_attempt() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(1);
    let connector = RetryingConnector::new(broker.connector(), 3, Duration::from_millis(10));

    let connection = connector.connect().await;

    assert!(connection.is_ok());
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(connector.state(), ConnectionState::Connected);
    assert_eq!(
        connector.history(),
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test]
async fn test_fixed_delay_between_attempts() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(u32::MAX);
    let delay = Duration::from_millis(40);
    let connector = RetryingConnector::new(broker.connector(), 3, delay);

    let started = Instant::now();
    let _ = connector.connect().await;
    let elapsed = started.elapsed();

    // Two sleeps between three attempts, none after the last one
    assert!(elapsed >= delay * 2);
    assert!(elapsed < delay * 3 + Duration::from_millis(500));
}

#[tokio::test]
async fn test_zero_attempts_still_tries_once() {
    let broker = MemoryBroker::new();
    let connector = RetryingConnector::new(broker.connector(), 0, Duration::from_millis(10));

    assert!(connector.connect().await.is_ok());
    assert_eq!(broker.connect_attempts(), 1);
}
