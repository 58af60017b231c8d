//! Shared utilities for end-to-end gateway tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use mail_table_gateway::backend::{Backend, ReqwestClient};
use mail_table_gateway::config::{Endpoint, EndpointRegistry, Mode};
use mail_table_gateway::net::EventLoop;

const READ_DEADLINE: Duration = Duration::from_secs(5);

/// An endpoint on an ephemeral port pointing at `target`.
pub fn endpoint(name: &str, mode: Mode, target: &str) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        target: target.parse().unwrap(),
        bind_address: "127.0.0.1".parse().unwrap(),
        bind_port: 0,
        auth_token: "secret".to_string(),
        request_timeout: 2000,
        mode,
        list_separator: " ".to_string(),
    }
}

/// Start an event loop serving `endpoints` with a real reqwest client.
pub fn start_gateway(endpoints: Vec<Endpoint>) -> EventLoop {
    let client = ReqwestClient::new("gateway-test/1.0").unwrap();
    let backend = Backend::new(Arc::new(client), Handle::current());
    EventLoop::start(&EndpointRegistry::new(endpoints), backend).unwrap()
}

/// Connect to the named endpoint of a running gateway.
pub async fn connect(gateway: &EventLoop, name: &str) -> TcpStream {
    let addr = gateway.local_addr(name).unwrap();
    TcpStream::connect(addr).await.unwrap()
}

pub async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
}

/// Read until `done` accepts the bytes received so far.
pub async fn read_until(stream: &mut TcpStream, done: impl Fn(&[u8]) -> bool) -> String {
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(READ_DEADLINE, async {
        while !done(&received) {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(
                n > 0,
                "connection closed after {:?}",
                String::from_utf8_lossy(&received)
            );
            received.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("reply did not arrive in time");
    String::from_utf8(received).unwrap()
}

/// Read one newline-terminated tcp-lookup reply.
pub async fn read_line(stream: &mut TcpStream) -> String {
    read_until(stream, |b| b.ends_with(b"\n")).await
}

/// Read one `action=...\n\n` policy reply.
pub async fn read_action(stream: &mut TcpStream) -> String {
    read_until(stream, |b| b.ends_with(b"\n\n")).await
}

/// Read one complete netstring.
pub async fn read_netstring(stream: &mut TcpStream) -> String {
    read_until(stream, |b| {
        let Some(colon) = b.iter().position(|&c| c == b':') else {
            return false;
        };
        let Some(length) = std::str::from_utf8(&b[..colon])
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
        else {
            return false;
        };
        b.len() >= colon + 1 + length + 1
    })
    .await
}

/// Assert the peer closes the connection without sending anything more.
pub async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    let read = tokio::time::timeout(READ_DEADLINE, stream.read_to_end(&mut rest))
        .await
        .expect("connection was not closed");
    // A reset also counts as closed.
    if read.is_ok() {
        assert!(rest.is_empty(), "unexpected trailing bytes: {:?}", rest);
    }
}
