//! Fakes for the feed and the broker

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redalert_bridge::error::{BrokerError, FetchError, PublishError};
use redalert_bridge::feed::FeedClient;
use redalert_bridge::publisher::{Broker, Publisher, QoS};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const SAMPLE_ALERT: &str =
    r#"{"id":"X","cat":"10","title":"T","data":["A","B"],"desc":"D"}"#;

/// Feed returning scripted responses, then empty bodies forever
pub struct ScriptedFeed {
    responses: VecDeque<Result<Vec<u8>, FetchError>>,
}

impl ScriptedFeed {
    pub fn new(bodies: &[&str]) -> Self {
        Self {
            responses: bodies.iter().map(|b| Ok(b.as_bytes().to_vec())).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl FeedClient for ScriptedFeed {
    async fn fetch_raw(&mut self) -> Result<Vec<u8>, FetchError> {
        self.responses.pop_front().unwrap_or(Err(FetchError::Empty))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Broker that records connection attempts and publishes
///
/// The first `failures` connects fail. Setting the flag returned by
/// [`FakeBroker::drop_switch`] makes the open session report a lost
/// connection once.
pub struct FakeBroker {
    failures: AtomicUsize,
    attempts: mpsc::UnboundedSender<Instant>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    drop_connection: Arc<AtomicBool>,
}

impl FakeBroker {
    pub fn new(failures: usize) -> (Self, mpsc::UnboundedReceiver<Instant>) {
        let (attempts, attempts_rx) = mpsc::unbounded_channel();
        let broker = Self {
            failures: AtomicUsize::new(failures),
            attempts,
            published: Arc::new(Mutex::new(Vec::new())),
            drop_connection: Arc::new(AtomicBool::new(false)),
        };
        (broker, attempts_rx)
    }

    pub fn published(&self) -> Arc<Mutex<Vec<PublishedMessage>>> {
        self.published.clone()
    }

    pub fn drop_switch(&self) -> Arc<AtomicBool> {
        self.drop_connection.clone()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession, BrokerError> {
        let _ = self.attempts.send(Instant::now());

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::ConnectFailed("injected failure".to_string()));
        }

        Ok(FakeSession {
            published: self.published.clone(),
            drop_connection: self.drop_connection.clone(),
        })
    }
}

pub struct FakeSession {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    drop_connection: Arc<AtomicBool>,
}

#[async_trait]
impl Publisher for FakeSession {
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    fn check_connection(&mut self) -> Result<(), BrokerError> {
        if self.drop_connection.swap(false, Ordering::SeqCst) {
            return Err(BrokerError::ConnectionLost("injected drop".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {}
}
