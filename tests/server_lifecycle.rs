//! Control server lifecycle tests
//!
//! Real listeners and raw HTTP/1.1 clients:
//! 1. Serve, then drain within the deadline
//! 2. Deadline exceeded with a request in flight
//! 3. Fixed paths (metrics, profiling) and unknown paths
//! 4. Registration rules once serving

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use ctrlserver::http_server::{ControlError, ControlResult, ControlServer, ServerOptions, ServerState};
use ctrlserver::observability::{Level, LevelController};

struct RawReply {
    status: u16,
    /// Status line and headers, lowercased
    head: String,
    body: String,
}

async fn request(addr: SocketAddr, method: &str, path: &str) -> RawReply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head.split(' ').nth(1).unwrap().parse().unwrap();
    RawReply {
        status,
        head: head.to_ascii_lowercase(),
        body: body.to_string(),
    }
}

fn start(server: ControlServer) -> (Arc<ControlServer>, JoinHandle<ControlResult<()>>) {
    let server = Arc::new(server);
    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move { serving.serve().await });
    (server, handle)
}

async fn wait_until_serving(server: &ControlServer) {
    while server.state() != ServerState::Serving {
        tokio::task::yield_now().await;
    }
}

fn local_server(options: ServerOptions) -> ControlServer {
    ControlServer::new("127.0.0.1:0", options).unwrap()
}

// =============================================================================
// SERVE AND DRAIN
// =============================================================================

#[tokio::test]
async fn test_shutdown_within_deadline_refuses_new_connections() {
    let controller = LevelController::new(Level::Warn);
    let (server, serving) = start(local_server(
        ServerOptions::new().with_level_controller(&controller),
    ));
    let addr = server.local_addr();

    let reply = request(addr, "GET", "/log/level").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "{\"level\":\"warn\"}\n");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    let result = serving.await.unwrap();
    assert!(matches!(result, Err(ControlError::ServerClosed)));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_deadline_exceeded_with_request_in_flight() {
    let entered = Arc::new(Notify::new());
    let server = local_server(ServerOptions::new());
    let signal = Arc::clone(&entered);
    server
        .add_handler(
            "/slow",
            get(move || {
                let signal = Arc::clone(&signal);
                async move {
                    signal.notify_one();
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "done"
                }
            }),
        )
        .unwrap();

    let (server, serving) = start(server);
    let addr = server.local_addr();
    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        let _ = stream.read_to_end(&mut raw).await;
    });
    entered.notified().await;

    let err = server.shutdown(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, ControlError::DeadlineExceeded(d) if d == Duration::from_millis(100)));
    assert_eq!(server.state(), ServerState::Stopped);

    assert!(serving.await.unwrap().unwrap_err().is_server_closed());
    // The aborted connection is closed under the client
    tokio::time::timeout(Duration::from_secs(5), client)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_repeated_shutdown_is_harmless() {
    let (server, serving) = start(local_server(ServerOptions::new()));
    wait_until_serving(&server).await;

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    server.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(serving.await.unwrap().is_err());
}

#[tokio::test]
async fn test_cancelled_serve_does_not_stall_shutdown() {
    let (server, serving) = start(local_server(ServerOptions::new()));
    wait_until_serving(&server).await;

    serving.abort();
    assert!(serving.await.unwrap_err().is_cancelled());
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(TcpStream::connect(server.local_addr()).await.is_err());

    let started = tokio::time::Instant::now();
    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(matches!(
        server.add_handler("/late", get(|| async { "late" })),
        Err(ControlError::ServerClosed)
    ));
}

// =============================================================================
// FIXED PATHS
// =============================================================================

#[tokio::test]
async fn test_metrics_exposition() {
    let (server, _serving) = start(local_server(ServerOptions::new().with_level_getter(|| Level::Info)));
    let addr = server.local_addr();

    request(addr, "GET", "/log/level").await;
    request(addr, "GET", "/nowhere").await;

    let reply = request(addr, "GET", "/metrics").await;
    assert_eq!(reply.status, 200);
    assert!(reply.head.contains("content-type: text/plain; version=0.0.4"));
    assert!(reply.head.contains("cache-control: no-cache, no-store, must-revalidate"));
    assert!(reply.body.contains("ctrlserver_log_level_reads_total 1"));
    assert!(reply.body.contains("ctrlserver_unknown_path_requests_total 1"));

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_metrics_handler_can_be_replaced() {
    let options = ServerOptions::new().with_metrics_handler(get(|| async { "custom exposition" }));
    let (server, _serving) = start(local_server(options));

    let reply = request(server.local_addr(), "GET", "/metrics").await;
    assert_eq!(reply.body, "custom exposition");

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_profiling_paths_respond() {
    let (server, _serving) = start(local_server(ServerOptions::new()));
    let addr = server.local_addr();

    let index = request(addr, "GET", "/debug/pprof/").await;
    assert_eq!(index.status, 200);
    assert!(index.body.contains("/debug/pprof/profile"));

    assert_eq!(request(addr, "GET", "/debug/pprof/cmdline").await.status, 200);

    let symbol = request(addr, "POST", "/debug/pprof/symbol").await;
    assert_eq!(symbol.body, "num_symbols: 0\n");

    let profile = request(addr, "GET", "/debug/pprof/profile?seconds=5").await;
    assert_eq!(profile.status, 501);
    let trace = request(addr, "GET", "/debug/pprof/trace?seconds=0").await;
    assert_eq!(trace.status, 400);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_unknown_path_gets_status_envelope() {
    let (server, _serving) = start(local_server(ServerOptions::new()));

    let reply = request(server.local_addr(), "GET", "/nowhere").await;
    assert_eq!(reply.status, 404);
    assert!(reply.head.contains("content-type: application/json; charset=utf-8"));
    let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], "Not Found");

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

// =============================================================================
// REGISTRATION
// =============================================================================

#[tokio::test]
async fn test_extra_path_served_alongside_fixed_ones() {
    let server = local_server(ServerOptions::new());
    server.add_handler("/healthz", get(|| async { "ok" })).unwrap();
    let (server, _serving) = start(server);

    let reply = request(server.local_addr(), "GET", "/healthz").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "ok");

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_no_registration_or_second_serve_while_serving() {
    let (server, _serving) = start(local_server(ServerOptions::new()));
    wait_until_serving(&server).await;

    assert!(matches!(
        server.add_handler("/late", get(|| async { "late" })),
        Err(ControlError::AlreadyServing)
    ));
    assert!(matches!(server.serve().await, Err(ControlError::AlreadyServing)));

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}
