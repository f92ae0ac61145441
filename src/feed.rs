//! Alert feed clients
//!
//! The monitor loop only sees the [`FeedClient`] trait. [`HttpFeedClient`]
//! polls the live upstream endpoint, [`DemoFeed`] produces a fixed sample
//! alert for running without the upstream.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{instrument, trace};

use crate::config::FeedConfig;
use crate::error::FetchError;

const REFERER: &str = "https://www.oref.org.il/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.97 Safari/537.36";
const REQUESTED_WITH: &str = "XMLHttpRequest";

/// Source of raw alert bodies
///
/// Implementations do not retry, the caller polls again on its own schedule.
#[async_trait]
pub trait FeedClient: Send {
    async fn fetch_raw(&mut self) -> Result<Vec<u8>, FetchError>;
}

/// Client for the upstream HTTP alert endpoint
pub struct HttpFeedClient {
    url: String,

    /// HTTP client (reused across requests)
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(config: &FeedConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_raw(&mut self) -> Result<Vec<u8>, FetchError> {
        trace!("requesting alerts");

        // the upstream rejects requests that do not look like its own web client
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::REFERER, REFERER)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-Requested-With", REQUESTED_WITH)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if body.is_empty() {
            return Err(FetchError::Empty);
        }

        trace!("received {} bytes", body.len());
        Ok(body.to_vec())
    }
}

/// Synthetic feed used in debug mode
///
/// Every fetch returns the same sample alert with an id one higher than the
/// previous one, starting at 1.
#[derive(Debug, Default)]
pub struct DemoFeed {
    counter: u64,
}

impl DemoFeed {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedClient for DemoFeed {
    async fn fetch_raw(&mut self) -> Result<Vec<u8>, FetchError> {
        self.counter += 1;

        let alert = serde_json::json!({
            "id": self.counter.to_string(),
            "cat": "10",
            "title": "בדקות הקרובות צפויות להתקבל התרעות באזורך",
            "data": ["ירושלים - מערב", "ירושלים - צפון"],
            "desc": "עליך לשפר את מיקומך למיגון המיטבי בקרבתך. במקרה של קבלת התרעה, יש להיכנס למרחב המוגן ולשהות בו 10 דקות."
        });

        Ok(alert.to_string().into_bytes())
    }
}
