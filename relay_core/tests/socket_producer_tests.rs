//! Socket producer integration tests over loopback TCP.

use relay_common::relay::component::RtComponent;
use relay_common::relay::config::{ComponentConfig, ComponentKind, SocketConfig, StalenessPolicy};
use relay_common::relay::handles::HandleRegistry;
use relay_core::components::position_feedback::PositionFeedbackSensor;
use relay_core::handoff::{HandoffConsumer, handoff};
use relay_core::producer::socket::ReceiverSettings;
use relay_core::producer::{ProducerError, RecordPublisher, SocketProducer};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(20);
const DEADLINE: Duration = Duration::from_secs(5);

fn socket_config(port: u16) -> SocketConfig {
    SocketConfig {
        port,
        bind_address: "127.0.0.1".to_string(),
        poll_period_ms: POLL.as_millis() as u64,
        start_delay_ms: 0,
    }
}

fn start(axes: usize, staleness: StalenessPolicy) -> (SocketProducer, HandoffConsumer) {
    start_on(0, axes, staleness).expect("start producer")
}

fn start_on(
    port: u16,
    axes: usize,
    staleness: StalenessPolicy,
) -> Result<(SocketProducer, HandoffConsumer), ProducerError> {
    let (tx, rx) = handoff(axes);
    let settings = ReceiverSettings {
        poll_period: POLL,
        staleness,
        start_delay: Duration::ZERO,
    };
    let producer = SocketProducer::start(
        &socket_config(port),
        settings,
        RecordPublisher::new("socket-test", axes, tx),
    )?;
    Ok((producer, rx))
}

fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).expect("connect to producer")
}

/// Wait for the next non-sentinel record.
fn next_values(rx: &mut HandoffConsumer) -> Vec<f64> {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Some(record) = rx.try_consume() {
            if !record.is_sentinel() {
                return record.as_slice().to_vec();
            }
        }
        assert!(Instant::now() < deadline, "no record within {DEADLINE:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn line_reaches_consumer() {
    let (mut producer, mut rx) = start(2, StalenessPolicy::Latch);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"1.5, -2.5\n").unwrap();
    assert_eq!(next_values(&mut rx), vec![1.5, -2.5]);

    let stats = producer.stop().unwrap();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.lines, 1);
}

#[test]
fn newest_line_of_a_read_wins() {
    let (producer, mut rx) = start(1, StalenessPolicy::Latch);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"1\n2\n3\n").unwrap();
    let deadline = Instant::now() + DEADLINE;
    while next_values(&mut rx) != vec![3.0] {
        assert!(Instant::now() < deadline);
    }
}

#[test]
fn latch_publishes_nothing_when_idle() {
    let (mut producer, mut rx) = start(1, StalenessPolicy::Latch);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"4.0\n").unwrap();
    assert_eq!(next_values(&mut rx), vec![4.0]);

    thread::sleep(POLL * 5);
    assert!(rx.try_consume().is_none());
    assert_eq!(producer.stop().unwrap().sentinels, 0);
}

#[test]
fn reset_publishes_sentinel_when_idle() {
    let (mut producer, mut rx) = start(1, StalenessPolicy::Reset);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"4.0\n").unwrap();
    assert_eq!(next_values(&mut rx), vec![4.0]);

    let deadline = Instant::now() + DEADLINE;
    loop {
        if rx.try_consume().is_some_and(|r| r.is_sentinel()) {
            break;
        }
        assert!(Instant::now() < deadline, "no sentinel after idle");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(producer.stop().unwrap().sentinels > 0);
}

#[test]
fn bad_lines_are_dropped() {
    let (mut producer, mut rx) = start(2, StalenessPolicy::Latch);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"1.0 abc\n").unwrap();
    thread::sleep(POLL * 3);
    peer.write_all(b"1.0 2.0 3.0\n").unwrap();
    thread::sleep(POLL * 3);
    peer.write_all(b"5.0 6.0\n").unwrap();
    assert_eq!(next_values(&mut rx), vec![5.0, 6.0]);

    let stats = producer.stop().unwrap();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn unterminated_line_is_delivered_on_close() {
    let (mut producer, mut rx) = start(1, StalenessPolicy::Latch);
    let mut peer = connect(producer.local_addr());

    peer.write_all(b"0.5").unwrap();
    thread::sleep(POLL * 3);
    assert!(rx.try_consume().is_none());

    drop(peer);
    assert_eq!(next_values(&mut rx), vec![0.5]);
    assert_eq!(producer.stop().unwrap().lines, 1);
}

#[test]
fn reconnect_after_disconnect() {
    let (mut producer, mut rx) = start(1, StalenessPolicy::Latch);

    let mut first = connect(producer.local_addr());
    first.write_all(b"1\n").unwrap();
    assert_eq!(next_values(&mut rx), vec![1.0]);
    drop(first);

    let deadline = Instant::now() + DEADLINE;
    let mut second = connect(producer.local_addr());
    second.write_all(b"2\n").unwrap();
    while next_values(&mut rx) != vec![2.0] {
        assert!(Instant::now() < deadline);
    }

    assert_eq!(producer.stop().unwrap().connections, 2);
}

#[test]
fn stop_with_blocked_peer_is_prompt_and_frees_port() {
    let (mut producer, _rx) = start(1, StalenessPolicy::Latch);
    let port = producer.local_addr().port();
    let _peer = connect(producer.local_addr());
    thread::sleep(POLL * 3);

    let started = Instant::now();
    assert!(producer.stop().is_some());
    assert!(started.elapsed() < POLL * 10, "stop took {:?}", started.elapsed());
    assert!(!producer.is_running());
    assert!(producer.stop().is_none());

    let (mut again, _rx) = start_on(port, 1, StalenessPolicy::Latch).expect("port rebindable");
    assert_eq!(again.local_addr().port(), port);
    again.stop();
}

#[test]
fn port_in_use_is_bind_error() {
    let (producer, _rx) = start(1, StalenessPolicy::Latch);
    let port = producer.local_addr().port();

    assert!(matches!(
        start_on(port, 1, StalenessPolicy::Latch),
        Err(ProducerError::Bind { .. })
    ));
}

#[test]
fn invalid_bind_address_is_rejected() {
    let (tx, _rx) = handoff(1);
    let mut config = socket_config(0);
    config.bind_address = "not-an-address".to_string();
    let settings = ReceiverSettings {
        poll_period: POLL,
        staleness: StalenessPolicy::Latch,
        start_delay: Duration::ZERO,
    };

    assert!(matches!(
        SocketProducer::start(&config, settings, RecordPublisher::new("t", 1, tx)),
        Err(ProducerError::InvalidAddress(_))
    ));
}

#[test]
fn sensor_integrates_velocity_from_socket() {
    let handles = HandleRegistry::new();
    let position = handles.register("joint1/position", 0.0).unwrap();

    let mut config = ComponentConfig::new("feedback", ComponentKind::PositionFeedback, &["joint1"]);
    config.command_interfaces = vec!["joint1/position".to_string()];
    config.socket = Some(socket_config(0));

    let mut sensor = PositionFeedbackSensor::new("feedback");
    sensor.on_configure(&config, &handles).unwrap();
    sensor.on_activate(&handles).unwrap();

    let mut peer = connect(sensor.local_addr().unwrap());
    peer.write_all(b"10.0\n").unwrap();

    let period = Duration::from_millis(1);
    let deadline = Instant::now() + DEADLINE;
    while sensor.velocity() != 10.0 {
        assert!(Instant::now() < deadline, "velocity never arrived");
        let now = Instant::now();
        sensor.update_reference(now, period).unwrap();
        sensor.update_and_write(now, period).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    let before = position.get();
    let now = Instant::now();
    sensor.update_reference(now, period).unwrap();
    sensor.update_and_write(now, period).unwrap();
    assert!((position.get() - before - 0.01).abs() < 1e-9);

    let started = Instant::now();
    sensor.on_deactivate(&handles).unwrap();
    sensor.on_cleanup(&handles);
    assert!(started.elapsed() < POLL * 10);
    assert!(sensor.local_addr().is_none());
}
