//! Full monitor loop runs against fake feed and broker
//!
//! All tests run on a paused clock, sleeps inside the loop advance virtual
//! time instantly.

use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use redalert_bridge::monitor::{MonitorLoop, MonitorSettings};
use redalert_bridge::publisher::QoS;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_repeated_alert_is_published_once() {
    let (broker, _attempts) = FakeBroker::new(0);
    let published = broker.published();
    let feed = ScriptedFeed::new(&[SAMPLE_ALERT, SAMPLE_ALERT]);

    let handle = tokio::spawn(MonitorLoop::new(feed, broker, MonitorSettings::default()).run());
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    let published = published.lock().unwrap().clone();
    assert_eq!(published.len(), 2);

    assert_eq!(published[0].topic, "/redalert/cat/10");
    assert_eq!(published[0].qos, QoS::AtMostOnce);
    let structured: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(
        structured,
        serde_json::json!({"title": "T", "regions": ["A", "B"], "description": "D"})
    );

    assert_eq!(published[1].topic, "/redalert/raw_data");
    assert_eq!(published[1].payload, SAMPLE_ALERT.as_bytes());
}

#[tokio::test(start_paused = true)]
async fn test_drill_alert_is_never_published() {
    let drill = r#"{"id":"D","cat":"1","title":"T","data":["בדיקה"],"desc":"D"}"#;
    let (broker, _attempts) = FakeBroker::new(0);
    let published = broker.published();
    let feed = ScriptedFeed::new(&[drill, drill, drill]);

    let handle = tokio::spawn(MonitorLoop::new(feed, broker, MonitorSettings::default()).run());
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    assert!(published.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_is_retried_after_fixed_delay() {
    let (broker, mut attempts) = FakeBroker::new(2);
    let handle = tokio::spawn(
        MonitorLoop::new(ScriptedFeed::empty(), broker, MonitorSettings::default()).run(),
    );

    let first = attempts.recv().await.unwrap();
    let second = attempts.recv().await.unwrap();
    let third = attempts.recv().await.unwrap();
    handle.abort();

    for delay in [second - first, third - second] {
        assert!(delay >= Duration::from_secs(5), "retried after {delay:?}");
        assert!(delay < Duration::from_secs(6), "retried after {delay:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_triggers_reconnect() {
    let (broker, mut attempts) = FakeBroker::new(0);
    let drop_switch = broker.drop_switch();
    let published = broker.published();
    let feed = ScriptedFeed::new(&[SAMPLE_ALERT]);

    let handle = tokio::spawn(MonitorLoop::new(feed, broker, MonitorSettings::default()).run());

    let first = attempts.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    drop_switch.store(true, Ordering::SeqCst);

    let second = attempts.recv().await.unwrap();
    handle.abort();

    assert!(second - first >= Duration::from_secs(5));
    // the alert went out before the drop and is not repeated afterwards
    assert_eq!(published.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_survives_reconnect() {
    let (broker, mut attempts) = FakeBroker::new(0);
    let drop_switch = broker.drop_switch();
    let published = broker.published();
    let feed = ScriptedFeed::new(&[SAMPLE_ALERT, "", "", "", "", "", "", "", SAMPLE_ALERT]);

    let handle = tokio::spawn(MonitorLoop::new(feed, broker, MonitorSettings::default()).run());

    attempts.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop_switch.store(true, Ordering::SeqCst);
    attempts.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    handle.abort();

    assert_eq!(published.lock().unwrap().len(), 2);
}
