use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framestat_server::monitor::MonitorFactory;
use framestat_server::{Server, ServerSettings, SessionListener, TracingMonitorFactory, api};
use framestat_types::{ClientHello, CollectorDef, FrameData, TimeSample};
use framestat_wire::{
    ClientMessage, FrameMessage, ThreadDefs, encode_client_message_default, encode_protocol_magic,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

struct Harness {
    server: Arc<Server>,
    tcp_addr: SocketAddr,
    http_addr: SocketAddr,
}

async fn start() -> Harness {
    let factory: Arc<dyn MonitorFactory> = Arc::new(TracingMonitorFactory::new(8));
    let server = Server::new(ServerSettings::default(), factory);

    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind tcp");
    let tcp_addr = tcp.local_addr().expect("tcp addr");
    tokio::spawn(SessionListener::new(Arc::clone(&server)).run(tcp));

    let http = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
    let http_addr = http.local_addr().expect("http addr");
    let app = api::router(Arc::clone(&server));
    tokio::spawn(async move {
        let _ = axum::serve(http, app).await;
    });

    Harness {
        server,
        tcp_addr,
        http_addr,
    }
}

fn timed(start: f64) -> FrameData {
    FrameData {
        times: vec![
            TimeSample {
                collector: 0,
                time: start,
            },
            TimeSample {
                collector: 1,
                time: start + 0.004,
            },
        ],
        levels: Vec::new(),
    }
}

async fn send(stream: &mut TcpStream, message: ClientMessage) {
    let frame = encode_client_message_default(&message).expect("encode");
    stream.write_all(&frame).await.expect("send");
}

async fn connect_profiled_client(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(&encode_protocol_magic())
        .await
        .expect("magic");
    send(
        &mut stream,
        ClientMessage::Hello(ClientHello {
            hostname: "render-box".into(),
            progname: "asteroids".into(),
            pid: 4242,
            major_version: 3,
            minor_version: 3,
        }),
    )
    .await;
    send(
        &mut stream,
        ClientMessage::CollectorDefs(vec![
            CollectorDef::new(0, "Frame", 0),
            CollectorDef::new(1, "Render", 0),
            CollectorDef::new(2, "Draw", 1),
        ]),
    )
    .await;
    send(
        &mut stream,
        ClientMessage::ThreadDefs(ThreadDefs {
            first_index: 0,
            names: vec!["Main".into()],
        }),
    )
    .await;
    for number in [1, 2, 4] {
        send(
            &mut stream,
            ClientMessage::Frame(FrameMessage {
                thread: 0,
                frame_number: number,
                data: timed(f64::from(number) * 0.25),
            }),
        )
        .await;
    }
    stream
}

/// Blocking HTTP call on the blocking pool. Returns status and body.
async fn http(method: &'static str, url: String) -> (u16, String) {
    tokio::task::spawn_blocking(move || {
        let response = match ureq::request(method, &url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => panic!("{method} {url} failed: {e}"),
        };
        let status = response.status();
        let body = response.into_string().expect("utf8 body");
        (status, body)
    })
    .await
    .expect("blocking task")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not hold within 2s");
}

#[tokio::test]
async fn query_api_reflects_a_live_session() {
    let harness = start().await;
    let base = format!("http://{}", harness.http_addr);
    let _client = connect_profiled_client(harness.tcp_addr).await;

    let server = Arc::clone(&harness.server);
    wait_for(move || {
        server.sessions().first().is_some_and(|session| {
            session
                .thread_data(0)
                .is_some_and(|data| data.read().latest_frame_number() == Some(4))
        })
    })
    .await;

    let (status, body) = http("GET", format!("{base}/health")).await;
    assert_eq!((status, body.as_str()), (200, "ok"));

    let (status, body) = http("GET", format!("{base}/api/sessions")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""live_sessions":1"#), "{body}");
    assert!(body.contains(r#""session_id":1"#), "{body}");
    assert!(body.contains(r#""progname":"asteroids""#), "{body}");
    assert!(body.contains(r#""alive":true"#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/collectors")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""full_name":"Render:Draw""#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/threads")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""name":"Main""#), "{body}");
    assert!(body.contains(r#""latest_frame_number":4"#), "{body}");
    assert!(body.contains(r#""oldest_frame_number":1"#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/threads/0/frames/2")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""frame_number":2"#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/threads/0/frames/3")).await;
    assert_eq!(status, 404, "frame 3 is a gap: {body}");
    assert!(body.contains(r#""error""#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/threads/0/at/0.75")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""frame_number":2"#), "{body}");

    let (status, _) = http("GET", format!("{base}/api/sessions/1/threads/7")).await;
    assert_eq!(status, 404);

    let (status, _) = http("GET", format!("{base}/api/sessions/99/threads")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn close_then_remove_a_session() {
    let harness = start().await;
    let base = format!("http://{}", harness.http_addr);
    let _client = connect_profiled_client(harness.tcp_addr).await;

    let server = Arc::clone(&harness.server);
    wait_for(move || {
        server
            .sessions()
            .first()
            .is_some_and(|session| session.is_client_known())
    })
    .await;

    let (status, body) = http("POST", format!("{base}/api/sessions/1/close")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""was_alive":true"#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""live_sessions":0"#), "{body}");
    assert!(body.contains(r#""alive":false"#), "{body}");

    let (status, body) = http("GET", format!("{base}/api/sessions/1/threads")).await;
    assert_eq!(status, 200, "dead sessions stay queryable");
    assert!(body.contains(r#""name":"Main""#), "{body}");

    let (status, body) = http("DELETE", format!("{base}/api/sessions/1")).await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""was_alive":false"#), "{body}");

    let (status, _) = http("GET", format!("{base}/api/sessions/1/collectors")).await;
    assert_eq!(status, 404);
    assert!(harness.server.sessions().is_empty());
}
