pub mod config;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod filter;
pub mod monitor;
pub mod parser;
pub mod publisher;

use serde::{Deserialize, Serialize};

/// One alert as published by the upstream feed, normalized
///
/// `raw_payload` holds the cleaned text the record was parsed from, so it can
/// be republished verbatim even when the structured fields fell back to
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub category: String,
    pub title: String,
    pub regions: Vec<String>,
    pub description: String,
    pub raw_payload: String,
}
