//! MonitorLoop - polls the alert feed and republishes new alerts
//!
//! ## State Machine
//!
//! ```text
//!                connect ok
//! Disconnected ─────────────► ConnectedIdle ◄──┐
//!      ▲   │                     │             │ sleep(poll interval)
//!      │   │ connect failed      ▼             │
//!      │   │                  Polling ─────────┘
//!      │   ▼                     │
//!      └─ ReconnectBackoff ◄─────┘ connection lost
//!         sleep(reconnect delay)
//! ```
//!
//! Fetch, parse and publish failures never leave the connected states, they
//! are logged and the cycle counts as empty. Only broker level errors lead to
//! a reconnect, with a constant delay and no retry limit.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::AlertRecord;
use crate::config::Config;
use crate::dedup::DedupStore;
use crate::error::{BrokerError, FetchError, ParseError};
use crate::feed::FeedClient;
use crate::filter::is_test_alert;
use crate::parser::parse_alert;
use crate::publisher::{AlertTopics, Broker, Publisher, publish_alert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Disconnected,
    ConnectedIdle,
    Polling,
    ReconnectBackoff,
}

/// What a single poll cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing usable was fetched
    NoRecord,
    /// Alert id is still in the dedup window
    Duplicate(String),
    /// Drill alert, dropped without reserving its id
    Suppressed(String),
    /// New alert, `messages` of the two publishes went out
    Published { id: String, messages: usize },
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub topic: String,
    pub include_test_alerts: bool,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub alert_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            topic: "/redalert".to_string(),
            include_test_alerts: false,
            poll_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            alert_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            topic: config.mqtt.topic.clone(),
            include_test_alerts: config.include_test_alerts,
            poll_interval: config.timing.poll_interval(),
            reconnect_delay: config.timing.reconnect_delay(),
            alert_ttl: config.timing.alert_ttl(),
            sweep_interval: config.timing.sweep_interval(),
        }
    }
}

pub struct MonitorLoop<F, B> {
    feed: F,
    broker: B,
    settings: MonitorSettings,
    topics: AlertTopics,

    /// Ids published within the TTL, only written by this loop
    dedup: DedupStore,

    last_sweep: Instant,
    state: MonitorState,
}

impl<F, B> MonitorLoop<F, B>
where
    F: FeedClient,
    B: Broker,
{
    pub fn new(feed: F, broker: B, settings: MonitorSettings) -> Self {
        let topics = AlertTopics::new(&settings.topic);
        Self {
            feed,
            broker,
            settings,
            topics,
            dedup: DedupStore::new(),
            last_sweep: Instant::now(),
            state: MonitorState::Disconnected,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Run until the surrounding task is cancelled
    #[instrument(skip(self), fields(topic = %self.settings.topic))]
    pub async fn run(mut self) {
        info!("monitoring alerts, sending to topic: {}", self.settings.topic);

        loop {
            self.transition(MonitorState::Disconnected);

            let cause = match self.broker.connect().await {
                Ok(mut session) => {
                    info!("connected to MQTT broker");
                    self.transition(MonitorState::ConnectedIdle);

                    let cause = self.run_session(&mut session).await;
                    session.disconnect().await;
                    cause
                }
                Err(e) => e,
            };

            error!(
                "MQTT error: {cause}. Reconnecting in {} seconds...",
                self.settings.reconnect_delay.as_secs()
            );
            self.transition(MonitorState::ReconnectBackoff);
            sleep(self.settings.reconnect_delay).await;
        }
    }

    /// Poll over one connection until it fails
    async fn run_session<P>(&mut self, session: &mut P) -> BrokerError
    where
        P: Publisher + ?Sized,
    {
        loop {
            if let Err(e) = session.check_connection() {
                return e;
            }

            let outcome = self.poll_once(session).await;
            trace!("poll cycle finished: {outcome:?}");

            sleep(self.settings.poll_interval).await;
        }
    }

    /// One fetch, parse, gate and publish cycle, followed by a sweep when due
    pub async fn poll_once<P>(&mut self, publisher: &mut P) -> PollOutcome
    where
        P: Publisher + ?Sized,
    {
        self.transition(MonitorState::Polling);

        let outcome = match self.fetch_record().await {
            Some(record) => self.handle_record(publisher, record).await,
            None => PollOutcome::NoRecord,
        };

        let now = Instant::now();
        if now.saturating_duration_since(self.last_sweep) > self.settings.sweep_interval {
            self.dedup.sweep(now, self.settings.alert_ttl);
            self.last_sweep = now;
        }

        self.transition(MonitorState::ConnectedIdle);
        outcome
    }

    async fn fetch_record(&mut self) -> Option<AlertRecord> {
        let body = match self.feed.fetch_raw().await {
            Ok(body) => body,
            Err(FetchError::Empty) => return None,
            Err(FetchError::Http(status)) => {
                warn!("Failed to fetch alerts: HTTP {status}");
                return None;
            }
            Err(e) => {
                error!("{e}");
                return None;
            }
        };

        match parse_alert(&body) {
            Ok(record) => {
                debug!("alert data successfully parsed");
                Some(record)
            }
            Err(ParseError::Blank) => None,
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }

    async fn handle_record<P>(&mut self, publisher: &mut P, record: AlertRecord) -> PollOutcome
    where
        P: Publisher + ?Sized,
    {
        if self.dedup.has_seen(&record.id) {
            trace!("alert {} already published", record.id);
            return PollOutcome::Duplicate(record.id);
        }

        if is_test_alert(&record, self.settings.include_test_alerts) {
            debug!("suppressing drill alert {}", record.id);
            return PollOutcome::Suppressed(record.id);
        }

        self.dedup.mark_seen(record.id.clone(), Instant::now());
        info!("New alert: {record:?}");

        let messages = publish_alert(publisher, &self.topics, &record).await;
        PollOutcome::Published {
            id: record.id,
            messages,
        }
    }

    fn transition(&mut self, next: MonitorState) {
        if self.state != next {
            trace!("state {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }
}
