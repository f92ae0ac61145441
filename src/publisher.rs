//! Broker connection and alert publishing
//!
//! [`Broker`] opens connections, each connection is a [`Publisher`]. The MQTT
//! implementation drives the `rumqttc` event loop on a background task and
//! reports a dropped connection through [`Publisher::check_connection`].
//!
//! Every accepted alert becomes two messages:
//!
//! ```text
//! <base>/cat/<category>   {"title": .., "regions": [..], "description": ..}
//! <base>/raw_data         cleaned feed body, verbatim
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

pub use rumqttc::QoS;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet};

use crate::AlertRecord;
use crate::config::MqttConfig;
use crate::error::{BrokerError, PublishError};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 10;

/// Factory for broker connections
#[async_trait]
pub trait Broker: Send + Sync {
    type Session: Publisher;

    async fn connect(&self) -> Result<Self::Session, BrokerError>;
}

/// An open broker connection
#[async_trait]
pub trait Publisher: Send {
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), PublishError>;

    /// Err once the underlying connection is gone
    fn check_connection(&mut self) -> Result<(), BrokerError>;

    async fn disconnect(&mut self);
}

/// Topic layout under a base topic
#[derive(Debug, Clone)]
pub struct AlertTopics {
    base: String,
}

impl AlertTopics {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn category(&self, category: &str) -> String {
        format!("{}/cat/{category}", self.base)
    }

    pub fn raw(&self) -> String {
        format!("{}/raw_data", self.base)
    }
}

/// Body of the per-category message
#[derive(Debug, Clone, Serialize)]
pub struct StructuredAlert<'a> {
    pub title: &'a str,
    pub regions: &'a [String],
    pub description: &'a str,
}

impl<'a> From<&'a AlertRecord> for StructuredAlert<'a> {
    fn from(record: &'a AlertRecord) -> Self {
        Self {
            title: &record.title,
            regions: &record.regions,
            description: &record.description,
        }
    }
}

/// Publish both messages for `record` at most once
///
/// The two publishes are independent, a failure is logged and does not stop
/// the other one. Returns how many messages were handed to the broker.
#[instrument(skip_all, fields(id = %record.id))]
pub async fn publish_alert<P>(publisher: &mut P, topics: &AlertTopics, record: &AlertRecord) -> usize
where
    P: Publisher + ?Sized,
{
    let mut published = 0;

    match serde_json::to_vec(&StructuredAlert::from(record)) {
        Ok(payload) => {
            let topic = topics.category(&record.category);
            match publisher.publish(&topic, payload, QoS::AtMostOnce).await {
                Ok(()) => published += 1,
                Err(e) => error!("failed to publish alert to {topic}: {e}"),
            }
        }
        Err(e) => error!("failed to serialize alert: {e}"),
    }

    let topic = topics.raw();
    match publisher
        .publish(&topic, record.raw_payload.clone().into_bytes(), QoS::AtMostOnce)
        .await
    {
        Ok(()) => published += 1,
        Err(e) => error!("failed to publish alert to {topic}: {e}"),
    }

    if published > 0 {
        info!("alert published to MQTT topics");
    }

    published
}

/// MQTT broker reachable over TCP
#[derive(Debug, Clone)]
pub struct MqttBroker {
    options: MqttOptions,
}

impl MqttBroker {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(&config.username, &config.password);

        Self { options }
    }

    pub fn address(&self) -> (String, u16) {
        self.options.broker_address()
    }
}

#[async_trait]
impl Broker for MqttBroker {
    type Session = MqttSession;

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<MqttSession, BrokerError> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BrokerError::ConnectFailed("timed out waiting for CONNACK".to_string()))??;

        let (lost_tx, lost_rx) = oneshot::channel();
        let driver = tokio::spawn(drive_event_loop(eventloop, lost_tx));

        Ok(MqttSession {
            client,
            lost_rx,
            driver,
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BrokerError::ConnectFailed(format!("broker refused: {code:?}"))),
                };
            }
            Ok(event) => trace!("MQTT event while connecting: {event:?}"),
            Err(e) => return Err(BrokerError::ConnectFailed(e.to_string())),
        }
    }
}

/// Keeps the connection alive until the first error
async fn drive_event_loop(mut eventloop: EventLoop, lost_tx: oneshot::Sender<BrokerError>) {
    loop {
        match eventloop.poll().await {
            Ok(event) => trace!("MQTT event: {event:?}"),
            Err(e) => {
                let _ = lost_tx.send(BrokerError::ConnectionLost(e.to_string()));
                break;
            }
        }
    }
}

pub struct MqttSession {
    client: AsyncClient,
    lost_rx: oneshot::Receiver<BrokerError>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl Publisher for MqttSession {
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), PublishError> {
        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| PublishError::Failed(e.to_string()))
    }

    fn check_connection(&mut self) -> Result<(), BrokerError> {
        match self.lost_rx.try_recv() {
            Ok(e) => Err(e),
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => Err(BrokerError::ConnectionLost(
                "event loop stopped".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("disconnect request not delivered: {e}");
        }
        self.driver.abort();
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
