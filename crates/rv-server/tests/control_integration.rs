//! Control-plane integration tests over a real TCP control socket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use rv_core::config::ServerConfig;
use rv_core::control::{ConnectionInfo, ControlEndpoint};
use rv_protocol::{Mode, MuxConfig, Session};
use rv_server::{Daemon, ServerState, MAGIC_PREAMBLE};

struct Running {
    state: Arc<ServerState>,
    agent_addr: SocketAddr,
    control_addr: SocketAddr,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start() -> Running {
    let config = ServerConfig {
        port: 0,
        bind_host: "127.0.0.1".to_string(),
        control: "tcp:127.0.0.1:0".parse().unwrap(),
        health_interval: Duration::from_secs(60),
        shutdown_grace: Duration::from_millis(50),
        ..Default::default()
    };
    let daemon = Daemon::bind(config).await.unwrap();
    let control_addr = match daemon.control_endpoint() {
        ControlEndpoint::Tcp(addr) => *addr,
        other => panic!("expected a tcp endpoint, got {}", other),
    };
    Running {
        state: Arc::clone(daemon.state()),
        agent_addr: daemon.agent_addr().unwrap(),
        control_addr,
        task: tokio::spawn(daemon.run()),
    }
}

/// Send one HTTP/1.1 request and return (status, body)
async fn request(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n",
        method, path
    );
    match body {
        Some(body) => raw.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )),
        None => raw.push_str("Content-Length: 0\r\n\r\n"),
    }
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("control plane should answer")
        .unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn connect_agent(addr: SocketAddr) -> Session {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(&MAGIC_PREAMBLE).await.unwrap();
    Session::new(socket, Mode::Server, MuxConfig::default()).unwrap()
}

async fn wait_for_len(state: &ServerState, len: usize) {
    timeout(Duration::from_secs(5), async {
        while state.registry.len() != len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry size never settled");
}

#[tokio::test]
async fn test_list_reflects_registry() {
    let server = start().await;

    let (status, body) = request(server.control_addr, "GET", "/connections", None).await;
    assert_eq!(status, 200);
    assert_eq!(body.trim(), "[]");

    let _agent = connect_agent(server.agent_addr).await;
    wait_for_len(&server.state, 1).await;

    let (status, body) = request(server.control_addr, "GET", "/connections", None).await;
    assert_eq!(status, 200);
    let listed: Vec<ConnectionInfo> = serde_json::from_str(&body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].ip, "127.0.0.1");
    assert!(listed[0].listen_addr.starts_with("127.0.0.1:"));
}

#[tokio::test]
async fn test_close_known_and_unknown() {
    let server = start().await;
    let agent = connect_agent(server.agent_addr).await;
    wait_for_len(&server.state, 1).await;
    let id = server.state.registry.snapshot()[0].id.clone();

    let (status, body) = request(
        server.control_addr,
        "POST",
        "/close",
        Some(r#"{"id":"deadbeef"}"#),
    )
    .await;
    assert_eq!(status, 404);
    assert!(body.contains("connection not found"));
    assert_eq!(server.state.registry.len(), 1);

    let close = format!(r#"{{"id":"{}"}}"#, id);
    let (status, body) = request(server.control_addr, "POST", "/close", Some(&close)).await;
    assert_eq!(status, 200);
    assert!(body.contains("closed"));
    assert!(server.state.registry.is_empty());

    timeout(Duration::from_secs(5), agent.closed())
        .await
        .expect("agent session should end");

    // A second close of the same id is a miss
    let (status, _) = request(server.control_addr, "POST", "/close", Some(&close)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_close_rejects_malformed_body() {
    let server = start().await;
    let (status, body) = request(server.control_addr, "POST", "/close", Some("{not json")).await;
    assert_eq!(status, 400);
    assert!(body.contains("error"));
}

#[tokio::test]
async fn test_shutdown_answers_then_drains() {
    let server = start().await;
    let agent = connect_agent(server.agent_addr).await;
    wait_for_len(&server.state, 1).await;

    let (status, body) = request(server.control_addr, "POST", "/shutdown", None).await;
    assert_eq!(status, 200);
    assert!(body.contains("shutting down"));

    timeout(Duration::from_secs(10), server.task)
        .await
        .expect("daemon should exit after shutdown")
        .unwrap()
        .unwrap();
    assert!(server.state.registry.is_empty());
    timeout(Duration::from_secs(5), agent.closed())
        .await
        .expect("agent should be disconnected");
    assert!(TcpStream::connect(server.control_addr).await.is_err());
}
