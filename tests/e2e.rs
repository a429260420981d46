//! End-to-end tests against an in-process mock SMSC.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Instant};

use smpp_loadgen::config::{
    ClientConfig, MessageConfig, SendConfig, ServerConfig, ServerEndpoint, ServiceConfig,
    SessionRole,
};
use smpp_loadgen::metrics::Counter;
use smpp_loadgen::smpp::pdu::{BindResp, CodecError, CommandStatus, DeliverSm, Frame, SubmitSmResp};
use smpp_loadgen::{App, MetricsSink, SessionState};

async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Option<Frame> {
    loop {
        let mut cursor = Cursor::new(&buf[..]);
        match Frame::check(&mut cursor) {
            Ok(len) => {
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor).expect("valid frame");
                buf.advance(len);
                return Some(frame);
            }
            Err(CodecError::Incomplete) => {}
            Err(e) => panic!("codec error in mock server: {e}"),
        }
        if stream.read_buf(buf).await.expect("read") == 0 {
            return None;
        }
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &Frame) {
    stream.write_all(&frame.to_bytes()).await.expect("write");
}

/// How the mock SMSC treats the client: how many deliver_sm it pushes
/// after each bind, and which status it stamps on PDUs.
#[derive(Debug, Clone, Copy)]
struct MockBehavior {
    deliveries: u32,
    deliver_status: CommandStatus,
    submit_status: CommandStatus,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            deliveries: 0,
            deliver_status: CommandStatus::Ok,
            submit_status: CommandStatus::Ok,
        }
    }
}

/// Accept-loop SMSC: acks binds, answers submits and enquires per
/// `behavior`, and pushes `behavior.deliveries` deliver_sm after each bind.
fn spawn_mock_smsc(listener: TcpListener, behavior: MockBehavior) {
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve_connection(stream, behavior));
        }
    });
}

async fn serve_connection(mut stream: TcpStream, behavior: MockBehavior) {
    let mut buf = BytesMut::with_capacity(4096);

    let Some(Frame::Bind(bind)) = read_frame(&mut stream, &mut buf).await else {
        return;
    };
    write_frame(
        &mut stream,
        &Frame::BindResp(BindResp {
            kind: bind.kind,
            sequence_number: bind.sequence_number,
            status: CommandStatus::Ok,
            system_id: "mock".to_string(),
        }),
    )
    .await;

    for n in 0..behavior.deliveries {
        write_frame(
            &mut stream,
            &Frame::DeliverSm(DeliverSm {
                sequence_number: 1000 + n,
                status: behavior.deliver_status,
                source_addr: "40001".to_string(),
                destination_addr: "12345".to_string(),
                esm_class: 0,
                data_coding: 0,
                short_message: b"inbound".to_vec(),
            }),
        )
        .await;
    }

    while let Some(frame) = read_frame(&mut stream, &mut buf).await {
        match frame {
            Frame::SubmitSm(sm) => {
                write_frame(
                    &mut stream,
                    &Frame::SubmitSmResp(SubmitSmResp {
                        sequence_number: sm.sequence_number,
                        status: behavior.submit_status,
                        message_id: format!("id{}", sm.sequence_number),
                    }),
                )
                .await;
            }
            Frame::EnquireLink { sequence_number } => {
                write_frame(&mut stream, &Frame::EnquireLinkResp { sequence_number }).await;
            }
            Frame::Unbind { sequence_number } => {
                write_frame(
                    &mut stream,
                    &Frame::UnbindResp {
                        sequence_number,
                        status: CommandStatus::Ok,
                    },
                )
                .await;
                return;
            }
            Frame::DeliverSmResp { .. } => {}
            other => panic!("mock server got unexpected {}", other.name()),
        }
    }
}

fn service_conf(port: u16, role: SessionRole, count: u16) -> ServiceConfig {
    let mut send = SendConfig::default();
    send.content = "e2e test message".to_string();
    send.dst.daddr.generate_len = 5;
    ServiceConfig {
        smpp: vec![ServerConfig {
            server: ServerEndpoint {
                addr: "127.0.0.1".to_string(),
                port,
                username: "tester".to_string(),
                password: "secret".to_string(),
            },
            client: ClientConfig { role, count },
            message: MessageConfig { send },
        }],
        rest: Default::default(),
        log: Default::default(),
    }
}

async fn wait_all_connected(app: &App, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let states = app.session_states().await;
        if states.len() == expected && states.iter().all(|s| *s == SessionState::Connected) {
            return;
        }
        assert!(Instant::now() < deadline, "sessions never connected: {states:?}");
        sleep(Duration::from_millis(20)).await;
    }
}

fn total(sink: &MetricsSink, counter: Counter) -> u64 {
    sink.snapshot().iter().map(|i| i.get(counter)).sum()
}

#[tokio::test(flavor = "multi_thread")]
async fn transmitter_submits_at_the_published_rate() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(listener, MockBehavior::default());

    let conf = service_conf(port, SessionRole::Transmitter, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;
    assert_eq!(app.broker().subscriber_count(), 1);

    app.start_traffic(5).await;
    sleep(Duration::from_millis(1300)).await;

    let sink = app.sink();
    let submitted = total(&sink, Counter::Submit);
    // One burst at configuration plus at most one full window.
    assert!(
        (5..=10).contains(&submitted),
        "expected 5..=10 submits, saw {submitted}"
    );
    assert_eq!(total(&sink, Counter::SubmitFailure), 0);

    app.stop_traffic().await;
    assert_eq!(app.broker().subscriber_count(), 0);
    assert!(app.session_states().await.is_empty());

    // Counters are frozen once the sessions are gone.
    let frozen = total(&sink, Counter::Submit);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(total(&sink, Counter::Submit), frozen);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_rate_sessions_stay_bound_but_idle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(listener, MockBehavior::default());

    let conf = service_conf(port, SessionRole::Transmitter, 2);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 2).await;

    sleep(Duration::from_millis(300)).await;
    assert_eq!(total(&app.sink(), Counter::Submit), 0);

    app.stop_traffic().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn receiver_counts_inbound_deliveries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(listener, MockBehavior { deliveries: 3, ..Default::default() });

    let conf = service_conf(port, SessionRole::Receiver, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;

    let sink = app.sink();
    let deadline = Instant::now() + Duration::from_secs(3);
    while total(&sink, Counter::Deliver) < 3 {
        assert!(Instant::now() < deadline, "deliveries never counted");
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total(&sink, Counter::Deliver), 3);
    assert_eq!(total(&sink, Counter::DeliverFailure), 0);

    app.stop_traffic().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_submits_count_toward_both_totals() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(
        listener,
        MockBehavior {
            submit_status: CommandStatus::ThrottlingError,
            ..Default::default()
        },
    );

    let conf = service_conf(port, SessionRole::Transmitter, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;

    app.start_traffic(5).await;
    let sink = app.sink();
    let deadline = Instant::now() + Duration::from_secs(3);
    while total(&sink, Counter::Submit) == 0 {
        assert!(Instant::now() < deadline, "no submits recorded");
        sleep(Duration::from_millis(20)).await;
    }
    app.stop_traffic().await;

    // Every response counts once as traffic and once more as a failure.
    let submitted = total(&sink, Counter::Submit);
    assert!(submitted >= 1);
    assert_eq!(total(&sink, Counter::SubmitFailure), submitted);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_deliveries_count_toward_both_totals() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(
        listener,
        MockBehavior {
            deliveries: 3,
            deliver_status: CommandStatus::SystemError,
            ..Default::default()
        },
    );

    let conf = service_conf(port, SessionRole::Receiver, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;

    let sink = app.sink();
    let deadline = Instant::now() + Duration::from_secs(3);
    while total(&sink, Counter::Deliver) < 3 {
        assert!(Instant::now() < deadline, "deliveries never counted");
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total(&sink, Counter::Deliver), 3);
    assert_eq!(total(&sink, Counter::DeliverFailure), 3);

    app.stop_traffic().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transceiver_handles_inbound_while_rate_is_zero() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(listener, MockBehavior { deliveries: 3, ..Default::default() });

    let conf = service_conf(port, SessionRole::Transceiver, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;

    // No rate was ever published, so the limiter denies every admission;
    // inbound must flow regardless.
    let sink = app.sink();
    let deadline = Instant::now() + Duration::from_secs(3);
    while total(&sink, Counter::Deliver) < 3 {
        assert!(Instant::now() < deadline, "inbound starved at zero rate");
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total(&sink, Counter::Deliver), 3);
    assert_eq!(total(&sink, Counter::Submit), 0);

    app.stop_traffic().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_rebind_through_start_traffic_after_stop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_mock_smsc(listener, MockBehavior::default());

    let conf = service_conf(port, SessionRole::Transmitter, 1);
    let app = Arc::new(App::new(&conf));
    app.start_sessions().await;
    wait_all_connected(&app, 1).await;

    app.stop_traffic().await;
    assert!(app.session_states().await.is_empty());

    // startLoop after a stop binds a fresh fleet before publishing.
    app.start_traffic(3).await;
    wait_all_connected(&app, 1).await;

    let deadline = Instant::now() + Duration::from_secs(3);
    let sink = app.sink();
    while total(&sink, Counter::Submit) == 0 {
        assert!(Instant::now() < deadline, "no traffic after restart");
        sleep(Duration::from_millis(20)).await;
    }

    app.stop_traffic().await;
}
