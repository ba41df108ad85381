//! Integration tests for connection supervision against a scripted transport.

use crate::sensor_mock::{
    address, fast_config, heart_rate, power, wait_until, wheel, MockTransport, Script,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use trainerlink::sensors::{
    Channel, ConnectionState, ConnectionSupervisor, LatestValues, Metric, RunOutcome,
    SensorError, SensorEvent, SensorProxy,
};

struct Harness {
    supervisor: ConnectionSupervisor<MockTransport>,
    values: Arc<LatestValues>,
    state: Arc<watch::Sender<ConnectionState>>,
}

fn harness(transport: Arc<MockTransport>, channels: Vec<Channel>, retry_bound: u32) -> Harness {
    let values = Arc::new(LatestValues::new());
    let (state, _) = watch::channel(ConnectionState::Idle);
    let state = Arc::new(state);
    let supervisor = ConnectionSupervisor::new(
        "test sensor",
        address(),
        channels,
        transport,
        values.clone(),
        state.clone(),
        fast_config(retry_bound),
    );
    Harness {
        supervisor,
        values,
        state,
    }
}

fn proxy(
    transport: Arc<MockTransport>,
    metrics: Vec<Metric>,
    retry_bound: u32,
) -> SensorProxy<MockTransport> {
    SensorProxy::new("test sensor", address(), metrics, transport, fast_config(retry_bound))
}

#[tokio::test]
async fn test_gives_up_after_retry_bound() {
    let transport = Arc::new(MockTransport::unreachable());
    let (events_tx, events_rx) = crossbeam::channel::unbounded();
    let h = harness(transport.clone(), vec![Channel::HeartRate], 3);

    let outcome = h
        .supervisor
        .with_events(events_tx)
        .run(CancellationToken::new())
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(transport.connects(), 3);
    assert_eq!(transport.closes(), 0);
    assert_eq!(*h.state.borrow(), ConnectionState::Stopped);

    let events: Vec<SensorEvent> = events_rx.try_iter().collect();
    let states: Vec<ConnectionState> = events
        .iter()
        .filter_map(|e| match e {
            SensorEvent::ConnectionChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Retrying,
            ConnectionState::Connecting,
            ConnectionState::Retrying,
            ConnectionState::Connecting,
            ConnectionState::Stopped,
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, SensorEvent::Failed { attempts: 3, .. })));
}

#[tokio::test]
async fn test_single_attempt_bound() {
    let transport = Arc::new(MockTransport::unreachable());
    let h = harness(transport.clone(), vec![Channel::HeartRate], 1);

    let outcome = h.supervisor.run(CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        RunOutcome::RetriesExhausted { attempts: 1, .. }
    ));
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn test_invalid_address_is_not_retried() {
    let transport = Arc::new(MockTransport::new(vec![Script::Fail(
        SensorError::InvalidAddress(address()),
    )]));
    let h = harness(transport.clone(), vec![Channel::HeartRate], 3);

    let outcome = h.supervisor.run(CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            error: SensorError::InvalidAddress(_)
        }
    ));
    assert_eq!(transport.connects(), 1);
    assert_eq!(*h.state.borrow(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_missing_channel_closes_link_and_stops() {
    let transport = Arc::new(
        MockTransport::new(vec![Script::Hold(Vec::new())]).without_channel(Channel::Power),
    );
    let h = harness(
        transport.clone(),
        vec![Channel::HeartRate, Channel::Power],
        3,
    );

    let outcome = h.supervisor.run(CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            error: SensorError::UnsupportedChannel {
                channel: Channel::Power,
                ..
            }
        }
    ));
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_cancelled_before_run() {
    let transport = Arc::new(MockTransport::unreachable());
    let h = harness(transport.clone(), vec![Channel::HeartRate], 3);
    let token = CancellationToken::new();
    token.cancel();

    let outcome = h.supervisor.run(token).await;

    assert!(outcome.is_cancelled());
    assert_eq!(transport.connects(), 0);
    assert_eq!(*h.state.borrow(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_stream_updates_values() {
    let transport = Arc::new(MockTransport::new(vec![Script::Hold(vec![
        heart_rate(140),
        power(210),
    ])]));
    let h = harness(
        transport.clone(),
        vec![Channel::HeartRate, Channel::Power],
        3,
    );
    let values = h.values.clone();
    let token = CancellationToken::new();
    let task = tokio::spawn(h.supervisor.run(token.clone()));

    assert!(
        wait_until(|| {
            values.get(Metric::HeartRate) == Some(140.0) && values.get(Metric::Power) == Some(210.0)
        })
        .await
    );
    assert_eq!(*h.state.borrow(), ConnectionState::Streaming);

    token.cancel();
    let outcome = task.await.unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(transport.closes(), 1);
    assert_eq!(*h.state.borrow(), ConnectionState::Stopped);
    // Last values stay readable after the run ends
    assert_eq!(values.get(Metric::HeartRate), Some(140.0));
}

#[tokio::test]
async fn test_reconnect_starts_with_fresh_counters() {
    let transport = Arc::new(MockTransport::new(vec![
        Script::Drop(vec![wheel(100, 0), wheel(102, 1024)]),
        // A counter jump across the reconnect must not count as distance
        Script::Hold(vec![wheel(5000, 2048), wheel(5001, 3072)]),
    ]));
    let h = harness(transport.clone(), vec![Channel::SpeedCadence], 3);
    let values = h.values.clone();
    let token = CancellationToken::new();
    let task = tokio::spawn(h.supervisor.run(token.clone()));

    let expected_km = 3.0 * 2.109 / 1000.0;
    assert!(
        wait_until(|| {
            values
                .get(Metric::Distance)
                .is_some_and(|d| (d - expected_km).abs() < 1e-9)
                && transport.connects() == 2
        })
        .await
    );
    let speed = values.get(Metric::Speed).unwrap();
    assert!((speed - 2.109 * 3.6).abs() < 1e-6);

    token.cancel();
    assert!(task.await.unwrap().is_cancelled());
    assert_eq!(transport.closes(), 2);
}

#[tokio::test]
async fn test_flapping_link_stops_at_retry_bound() {
    let flap = || Script::Drop(vec![heart_rate(120)]);
    let transport = Arc::new(MockTransport::new((0..10).map(|_| flap()).collect()));
    let (events_tx, events_rx) = crossbeam::channel::unbounded();
    let h = harness(transport.clone(), vec![Channel::HeartRate], 3);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        h.supervisor.with_events(events_tx).run(CancellationToken::new()),
    )
    .await
    .expect("flapping link was retried past the bound");

    assert!(matches!(
        outcome,
        RunOutcome::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(transport.connects(), 3);
    assert_eq!(transport.closes(), 3);
    assert_eq!(*h.state.borrow(), ConnectionState::Stopped);
    assert_eq!(h.values.get(Metric::HeartRate), Some(120.0));

    let streamed = events_rx
        .try_iter()
        .filter(|e| {
            matches!(
                e,
                SensorEvent::ConnectionChanged {
                    state: ConnectionState::Streaming,
                    ..
                }
            )
        })
        .count();
    assert_eq!(streamed, 3);
}

#[tokio::test]
async fn test_stop_during_retry_delay() {
    let transport = Arc::new(MockTransport::unreachable());
    let mut config = fast_config(5);
    config.retry_delay = Duration::from_secs(30);
    let mut sensor = SensorProxy::new(
        "test sensor",
        address(),
        vec![Metric::HeartRate],
        transport.clone(),
        config,
    );
    let mut state = sensor.watch_state();

    sensor.start().unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Retrying),
    )
    .await
    .expect("sensor never entered Retrying")
    .unwrap();

    sensor.stop();
    let outcome = tokio::time::timeout(Duration::from_secs(2), sensor.join())
        .await
        .expect("stop did not interrupt the retry delay");

    assert!(outcome.is_some_and(|o| o.is_cancelled()));
    assert_eq!(transport.connects(), 1);
    assert_eq!(sensor.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_proxy_rejects_second_start() {
    let transport = Arc::new(MockTransport::new(vec![Script::Hold(Vec::new())]));
    let mut sensor = proxy(transport, vec![Metric::HeartRate], 3);

    sensor.start().unwrap();
    assert!(sensor.is_running());
    assert!(matches!(
        sensor.start(),
        Err(SensorError::AlreadyRunning(_))
    ));

    sensor.stop();
    assert!(sensor.join().await.is_some_and(|o| o.is_cancelled()));
    assert!(!sensor.is_running());
    assert!(sensor.join().await.is_none());
}

#[tokio::test]
async fn test_proxy_values_survive_restart() {
    let transport = Arc::new(MockTransport::new(vec![
        Script::Hold(vec![heart_rate(101)]),
        Script::Hold(Vec::new()),
    ]));
    let mut sensor = proxy(transport.clone(), vec![Metric::HeartRate], 3);
    let reader = sensor.reader();

    sensor.start().unwrap();
    assert!(wait_until(|| reader.get(Metric::HeartRate) == Some(101.0)).await);
    sensor.stop();
    sensor.join().await;

    sensor.start().unwrap();
    let mut state = sensor.watch_state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Streaming),
    )
    .await
    .expect("sensor never streamed again")
    .unwrap();

    assert_eq!(reader.get(Metric::HeartRate), Some(101.0));
    assert_eq!(transport.connects(), 2);

    sensor.stop();
    sensor.join().await;
}
