//! Stats reporter against a live telemetry sink.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use event_relay::config::{shared, RuntimeConfig, SharedConfig};
use event_relay::lifecycle::ControlBits;
use event_relay::pool::{BlobStats, Counter, WorkerPool};
use event_relay::telemetry::{ReporterExit, StatsReporter};

mod common;

fn config_with_sink(sink: SocketAddr, add_ports: bool) -> SharedConfig {
    let mut runtime = RuntimeConfig::from_addresses(vec![
        "udp@0.0.0.0:10000".into(),
        "127.0.0.1:2001".into(),
        "127.0.0.1:2002".into(),
    ]);
    let telemetry = &mut runtime.snapshot.telemetry;
    telemetry.addr = sink.to_string();
    telemetry.target = "relay".into();
    telemetry.send_interval_ms = 50;
    telemetry.sleep_poll_interval_ms = 10;
    telemetry.add_ports = add_ports;
    shared(runtime)
}

fn config_for(sink: &common::TelemetrySink, add_ports: bool) -> SharedConfig {
    config_with_sink(sink.addr, add_ports)
}

struct Fixture {
    pool: Arc<WorkerPool>,
    control: Arc<ControlBits>,
    reporter: Arc<StatsReporter>,
}

fn fixture(config: SharedConfig) -> Fixture {
    let pool = Arc::new(WorkerPool::from_forwards(config.load().snapshot.forwards()));
    let control = Arc::new(ControlBits::new());
    let blobs = Arc::new(BlobStats::new());
    let reporter = StatsReporter::new(config, pool.clone(), blobs, control.clone())
        .with_hostname("host.example");
    Fixture {
        pool,
        control,
        reporter: Arc::new(reporter),
    }
}

#[tokio::test]
async fn test_reports_reach_sink_and_counts_are_drained() {
    let sink = common::TelemetrySink::start().await;
    let f = fixture(config_for(&sink, false));
    f.pool.member("127.0.0.1:2001").unwrap().stats.record(Counter::Received, 10);

    let handle = f.reporter.clone().spawn();

    let path = "relay.example.host.received.count";
    let seen = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { sink.values(path).len() >= 2 }
    })
    .await;
    assert!(seen);

    let values = sink.values(path);
    assert_eq!(values[0], 10);
    assert!(values[1..].iter().all(|v| *v == 0));

    f.control.set(ControlBits::STOPPING);
    assert_eq!(handle.destroy().await, Some(ReporterExit::Stopped));
    assert_eq!(handle.destroy().await, None);
}

#[tokio::test]
async fn test_per_destination_namespace() {
    let sink = common::TelemetrySink::start().await;
    let f = fixture(config_for(&sink, true));
    f.pool.member("127.0.0.1:2002").unwrap().stats.record(Counter::Sent, 3);

    let handle = f.reporter.clone().spawn();

    let path = "relay.example.host.udp_0_0_0_0_10000.127_0_0_1_2002.sent.count";
    let seen = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { sink.values(path).contains(&3) }
    })
    .await;
    assert!(seen);

    f.control.set(ControlBits::STOPPING);
    handle.destroy().await;
}

#[tokio::test]
async fn test_final_flush_on_reload() {
    let sink = common::TelemetrySink::start().await;
    let config = config_for(&sink, false);
    {
        let mut runtime = (**config.load()).clone();
        runtime.snapshot.telemetry.send_interval_ms = 60_000;
        config.store(Arc::new(runtime));
    }
    let f = fixture(config);
    let handle = f.reporter.clone().spawn();

    let path = "relay.example.host.dropped.count";
    let first = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { !sink.values(path).is_empty() }
    })
    .await;
    assert!(first);

    // Counted after the first report; only the final flush can carry it.
    f.pool.member("127.0.0.1:2001").unwrap().stats.record(Counter::Dropped, 7);
    f.control.set(ControlBits::RELOADING);
    assert_eq!(handle.destroy().await, Some(ReporterExit::Stopped));

    let flushed = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { sink.values(path).contains(&7) }
    })
    .await;
    assert!(flushed);
}

#[tokio::test]
async fn test_unrequested_exit_is_death() {
    let sink = common::TelemetrySink::start().await;
    let f = fixture(config_for(&sink, false));
    let handle = f.reporter.clone().spawn();

    // Stopping the worker without any lifecycle bit set.
    assert_eq!(handle.destroy().await, Some(ReporterExit::Died));
}

#[tokio::test]
async fn test_unreachable_sink_still_stops_promptly() {
    let sink = common::TelemetrySink::start().await;
    let config = config_for(&sink, false);
    {
        let mut runtime = (**config.load()).clone();
        runtime.snapshot.telemetry.addr = "127.0.0.1:1".into();
        config.store(Arc::new(runtime));
    }
    let f = fixture(config);
    let handle = f.reporter.clone().spawn();
    tokio::time::sleep(Duration::from_millis(200)).await;

    f.control.set(ControlBits::STOPPING);
    let exit = tokio::time::timeout(Duration::from_secs(5), handle.destroy())
        .await
        .unwrap();
    assert_eq!(exit, Some(ReporterExit::Stopped));
}

#[tokio::test]
async fn test_reconnects_after_sink_hangs_up() {
    let sink = common::HangupSink::start().await;
    let f = fixture(config_with_sink(sink.addr, false));
    let handle = f.reporter.clone().spawn();

    // Each hangup fails a later write, which drops the connection; the
    // following cycle has to connect again.
    let reconnected = common::eventually(Duration::from_secs(5), || {
        let sink = sink.clone();
        async move { sink.accepted() >= 3 }
    })
    .await;
    assert!(reconnected);

    f.control.set(ControlBits::STOPPING);
    assert_eq!(handle.destroy().await, Some(ReporterExit::Stopped));
}
