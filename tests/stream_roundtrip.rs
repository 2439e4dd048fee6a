use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lotmon::stream::relay::spawn_receiver;
use lotmon::stream::{FramedReader, StreamMessage};
use lotmon::{
    CurrentFrame, Frame, OccupancyReport, ProducerConfig, RelayServer, RelayServerConfig,
    RelayState, StateCell, StreamProducer,
};

fn spawn_producer(state: StateCell<CurrentFrame>) -> lotmon::ProducerHandle {
    StreamProducer::new(
        ProducerConfig {
            addr: "127.0.0.1:0".to_string(),
            frame_interval: Duration::from_millis(10),
            ..ProducerConfig::default()
        },
        state,
    )
    .spawn()
    .expect("spawn producer")
}

#[test]
fn producer_streams_the_published_frame_and_stats() {
    let state: StateCell<CurrentFrame> = StateCell::new();
    state.publish(CurrentFrame {
        frame: Frame::filled(32, 24, [80, 90, 100]),
        report: OccupancyReport::from_counts(4, 1),
    });
    let handle = spawn_producer(state);

    let stream = TcpStream::connect(handle.addr).expect("connect to producer");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = FramedReader::new(stream);
    let message = reader.read_message().expect("read one message");

    assert_eq!(message.stats, OccupancyReport::from_counts(4, 1));
    let frame = Frame::decode_jpeg(&message.frame).expect("decode streamed jpeg");
    assert_eq!(frame.width(), 32);
    assert_eq!(frame.height(), 24);

    handle.stop().expect("stop producer");
}

#[test]
fn relay_receiver_picks_up_the_producer_stream() {
    let producer_state: StateCell<CurrentFrame> = StateCell::new();
    producer_state.publish(CurrentFrame {
        frame: Frame::filled(16, 16, [10, 20, 30]),
        report: OccupancyReport::from_counts(3, 2),
    });
    let producer = spawn_producer(producer_state);

    let relay_state = RelayState::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let receiver = spawn_receiver(
        producer.addr.to_string(),
        relay_state.clone(),
        Duration::from_millis(100),
        shutdown.clone(),
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    let latest = loop {
        if let Some(latest) = relay_state.snapshot() {
            break latest;
        }
        assert!(Instant::now() < deadline, "no frame arrived at the relay");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(relay_state.connected());
    assert_eq!(latest.report, OccupancyReport::from_counts(3, 2));
    assert_eq!(latest.frame.width(), 16);

    shutdown.store(true, Ordering::SeqCst);
    receiver.join().expect("join receiver");
    producer.stop().expect("stop producer");
}

#[test]
fn receiver_waits_out_an_open_but_quiet_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind upstream");
    let addr = listener.local_addr().unwrap();

    let state = RelayState::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let receiver = spawn_receiver(
        addr.to_string(),
        state.clone(),
        Duration::from_millis(100),
        shutdown.clone(),
    );

    let (mut upstream, _) = listener.accept().expect("accept relay dial");
    let bytes = StreamMessage {
        stats: OccupancyReport::from_counts(2, 1),
        frame: Frame::filled(8, 8, [40, 40, 40]).encode_jpeg(70).unwrap(),
    }
    .encode()
    .unwrap();

    // Half the length prefix, then a long silence with the socket open.
    upstream.write_all(&bytes[..4]).unwrap();
    std::thread::sleep(Duration::from_secs(6));

    // Still parked on the same connection: connected, nothing published,
    // no second dial.
    assert!(state.connected(), "relay gave up on a quiet connection");
    assert!(state.snapshot().is_none());
    listener.set_nonblocking(true).unwrap();
    assert!(
        listener.accept().is_err(),
        "relay abandoned the connection and redialed"
    );

    // Completing the message delivers the frame over that connection.
    upstream.write_all(&bytes[4..]).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.snapshot().is_none() {
        assert!(Instant::now() < deadline, "completed message never arrived");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(
        state.snapshot().unwrap().report,
        OccupancyReport::from_counts(2, 1)
    );

    shutdown.store(true, Ordering::SeqCst);
    drop(upstream);
    receiver.join().expect("join receiver");
}

fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect to relay http");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).expect("read response");
    out
}

#[test]
fn relay_http_serves_stats_and_connection_status() {
    let state = RelayState::new();
    state.publish(
        Frame::filled(8, 8, [0, 0, 0]),
        OccupancyReport::from_counts(10, 4),
    );
    let server = RelayServer::new(
        RelayServerConfig {
            addr: "127.0.0.1:0".to_string(),
            ..RelayServerConfig::default()
        },
        state.clone(),
    )
    .spawn()
    .expect("spawn relay server");

    let stats = http_get(server.addr, "/stats");
    assert!(stats.starts_with("HTTP/1.1 200 OK"));
    assert!(stats.contains("\"total_spaces\":10"));
    assert!(stats.contains("\"occupied_spaces\":6"));

    let status = http_get(server.addr, "/connection_status");
    assert!(status.contains("\"connected\":false"));
    state.set_connected(true);
    let status = http_get(server.addr, "/connection_status");
    assert!(status.contains("\"connected\":true"));

    let index = http_get(server.addr, "/");
    assert!(index.contains("text/html"));
    assert!(index.contains("/video_feed"));

    let missing = http_get(server.addr, "/nope");
    assert!(missing.starts_with("HTTP/1.1 404"));

    server.stop().expect("stop relay server");
}

#[test]
fn relay_http_stats_default_before_first_frame() {
    let server = RelayServer::new(
        RelayServerConfig {
            addr: "127.0.0.1:0".to_string(),
            ..RelayServerConfig::default()
        },
        RelayState::new(),
    )
    .spawn()
    .expect("spawn relay server");

    let stats = http_get(server.addr, "/stats");
    assert!(stats.contains("\"total_spaces\":0"));
    assert!(stats.contains("\"occupancy_rate\":0"));

    server.stop().expect("stop relay server");
}
