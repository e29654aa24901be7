//! Reload cycle tests: file changes flowing through the main loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use event_relay::config::{shared, RuntimeConfig};
use event_relay::lifecycle::{ControlEvent, Relay, RunOutcome};
use event_relay::observability::{LogRouter, LogRouting};

mod common;

fn router() -> Arc<dyn LogRouting> {
    Arc::new(LogRouter::new(true))
}

#[tokio::test]
async fn test_reload_shrinks_pool_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let sink = common::TelemetrySink::start().await;
    let header = format!(
        "telemetry.addr = {}\n\
         telemetry.send_interval_ms = 50\n\
         telemetry.sleep_poll_interval_ms = 10\n",
        sink.addr
    );
    let path = common::write_config(
        dir.path(),
        &format!("{header}udp@0.0.0.0:10000\n127.0.0.1:2001\n127.0.0.1:2002\n127.0.0.1:2003\n"),
    );

    let relay = Relay::start(shared(RuntimeConfig::from_file(&path)), router()).unwrap();
    let config = relay.config().clone();
    let pool = relay.pool().clone();
    let control = relay.control().clone();
    assert_eq!(config.load().generation, 1);
    assert_eq!(pool.len(), 3);

    let (tx, rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(relay.run(rx));

    common::write_config(dir.path(), &format!("{header}udp@0.0.0.0:10000\n127.0.0.1:2001\n"));
    tx.send(ControlEvent::Reload).unwrap();

    let reloaded = common::eventually(Duration::from_secs(5), || {
        let pool = pool.clone();
        async move { pool.len() == 1 }
    })
    .await;
    assert!(reloaded);
    assert_eq!(config.load().generation, 2);
    assert_eq!(config.load().snapshot.forwards(), ["127.0.0.1:2001"]);
    assert_eq!(common::backup_count(dir.path()), 2);

    // The restarted reporter keeps shipping.
    let reporting = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { !sink.lines().is_empty() }
    })
    .await;
    assert!(reporting);

    tx.send(ControlEvent::Shutdown).unwrap();
    assert_eq!(run.await.unwrap(), RunOutcome::Clean);
    assert!(control.is_stopped());
}

#[tokio::test]
async fn test_rejected_reload_keeps_live_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_config(dir.path(), "udp@0.0.0.0:10000\n127.0.0.1:2001\n");

    let relay = Relay::start(shared(RuntimeConfig::from_file(&path)), router()).unwrap();
    let config = relay.config().clone();

    let (tx, rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(relay.run(rx));

    common::write_config(
        dir.path(),
        "server_socket_rcvbuf_bytes = 1048575\nudp@0.0.0.0:1\n127.0.0.1:2\n",
    );
    tx.send(ControlEvent::Reload).unwrap();

    // Events are handled in order, so the reload is done before shutdown.
    tx.send(ControlEvent::Shutdown).unwrap();
    assert_eq!(run.await.unwrap(), RunOutcome::Clean);

    let live = config.load();
    assert_eq!(live.generation, 1);
    assert_eq!(live.snapshot.listener(), Some("udp@0.0.0.0:10000"));
    assert_eq!(common::backup_count(dir.path()), 1);
}

#[tokio::test]
async fn test_closed_event_source_stops_relay() {
    let relay = Relay::start(
        shared(RuntimeConfig::from_addresses(vec![
            "udp@0.0.0.0:10000".into(),
            "127.0.0.1:2001".into(),
        ])),
        router(),
    )
    .unwrap();

    let (tx, rx) = mpsc::unbounded_channel::<ControlEvent>();
    drop(tx);
    assert_eq!(relay.run(rx).await, RunOutcome::Clean);
}
