use std::fmt;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

const MQTT_HOST: &str = "MQTT_HOST";
const MQTT_PORT: &str = "MQTT_PORT";
const MQTT_USER: &str = "MQTT_USER";
const MQTT_PASS: &str = "MQTT_PASS";
const MQTT_TOPIC: &str = "MQTT_TOPIC";
const MQTT_CLIENT_ID: &str = "MQTT_CLIENT_ID";
const INCLUDE_TEST_ALERTS: &str = "INCLUDE_TEST_ALERTS";
const DEBUG: &str = "DEBUG";
const FEED_URL: &str = "FEED_URL";
const POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
const RECONNECT_DELAY_SECS: &str = "RECONNECT_DELAY_SECS";
const ALERT_TTL_SECS: &str = "ALERT_TTL_SECS";
const SWEEP_INTERVAL_SECS: &str = "SWEEP_INTERVAL_SECS";

pub const DEFAULT_FEED_URL: &str = "https://www.oref.org.il/WarningMessages/alert/alerts.json";

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Publish drill alerts as well
    #[serde(default)]
    pub include_test_alerts: bool,

    /// Replace the live feed with the synthetic demo alert
    #[serde(default)]
    pub debug: bool,
}

#[derive(Clone, serde::Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Base topic, alerts go to `<topic>/cat/<category>` and `<topic>/raw_data`
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            topic: default_topic(),
            client_id: default_client_id(),
        }
    }
}

// keeps the password out of the logs
impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_alert_ttl")]
    pub alert_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            reconnect_delay_secs: default_reconnect_delay(),
            alert_ttl_secs: default_alert_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn alert_ttl(&self) -> Duration {
        Duration::from_secs(self.alert_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_host() -> String {
    String::from("127.0.0.1")
}

fn default_port() -> u16 {
    1883
}

fn default_username() -> String {
    String::from("user")
}

fn default_password() -> String {
    String::from("password")
}

fn default_topic() -> String {
    String::from("/redalert")
}

fn default_client_id() -> String {
    format!("redalert-bridge-{}", std::process::id())
}

fn default_feed_url() -> String {
    String::from(DEFAULT_FEED_URL)
}

fn default_request_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_alert_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Config {
    /// Build the configuration from process environment variables
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Missing keys fall back to the defaults, present but unparsable values
    /// are an error.
    pub fn from_lookup<L>(lookup: L) -> anyhow::Result<Config>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mqtt = MqttConfig {
            host: lookup(MQTT_HOST).unwrap_or_else(default_host),
            port: parse_number(&lookup, MQTT_PORT)?.unwrap_or_else(default_port),
            username: lookup(MQTT_USER).unwrap_or_else(default_username),
            password: lookup(MQTT_PASS).unwrap_or_else(default_password),
            topic: lookup(MQTT_TOPIC).unwrap_or_else(default_topic),
            client_id: lookup(MQTT_CLIENT_ID).unwrap_or_else(default_client_id),
        };

        let feed = FeedConfig {
            url: lookup(FEED_URL).unwrap_or_else(default_feed_url),
            ..FeedConfig::default()
        };

        let timing = TimingConfig {
            poll_interval_ms: parse_number(&lookup, POLL_INTERVAL_MS)?
                .unwrap_or_else(default_poll_interval),
            reconnect_delay_secs: parse_number(&lookup, RECONNECT_DELAY_SECS)?
                .unwrap_or_else(default_reconnect_delay),
            alert_ttl_secs: parse_number(&lookup, ALERT_TTL_SECS)?
                .unwrap_or_else(default_alert_ttl),
            sweep_interval_secs: parse_number(&lookup, SWEEP_INTERVAL_SECS)?
                .unwrap_or_else(default_sweep_interval),
        };

        let config = Config {
            mqtt,
            feed,
            timing,
            include_test_alerts: parse_flag(&lookup, INCLUDE_TEST_ALERTS)?.unwrap_or(false),
            debug: parse_flag(&lookup, DEBUG)?.unwrap_or(false),
        };
        trace!("loaded config from environment: {config:?}");

        Ok(config)
    }
}

fn parse_number<L, T>(lookup: &L, key: &str) -> anyhow::Result<Option<T>>
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {value:?}"))
        })
        .transpose()
}

fn parse_flag<L>(lookup: &L, key: &str) -> anyhow::Result<Option<bool>>
where
    L: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => bail!("invalid value for {key}: {value:?}"),
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
