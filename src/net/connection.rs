//! Per-socket connection task.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and backend correlation
//! - Feed readable bytes into the protocol session
//! - Apply submitted socket operations and drain them on write readiness
//! - Tear the socket down on EOF, read error, close request or loop stop
//!
//! # Design Decisions
//! - Runs on the loop thread only; all state here is `!Send`-friendly
//! - Readiness is awaited with `TcpStream::ready` and served with
//!   `try_read`/`try_write`, so one task covers both directions
//! - The read buffer is shared by every connection of the loop

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tracing::Instrument;
use uuid::Uuid;

use super::ops::{SocketOps, SubmissionQueue};
use super::writer::{Flush, Outbound};
use crate::handler::{Disposition, RequestContext, Session};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Size of the loop's reusable read buffer.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Read buffer shared by all connections on one loop thread.
pub type ReadBuffer = Rc<RefCell<Box<[u8]>>>;

pub fn read_buffer() -> ReadBuffer {
    Rc::new(RefCell::new(vec![0u8; READ_BUFFER_SIZE].into_boxed_slice()))
}

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    PeerClosed,
    ReadFailed,
    Closed,
    Stopped,
}

impl Ended {
    fn as_str(self) -> &'static str {
        match self {
            Ended::PeerClosed => "peer_closed",
            Ended::ReadFailed => "read_error",
            Ended::Closed => "closed",
            Ended::Stopped => "stopped",
        }
    }
}

/// One accepted client socket and everything it owns.
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    session: Session,
    outbound: Outbound,
    submissions: SubmissionQueue,
    ops: SocketOps,
    buffer: ReadBuffer,
    reading: bool,
    stop: ShutdownSignal,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        session: Session,
        buffer: ReadBuffer,
        stop: ShutdownSignal,
    ) -> Self {
        let id = ConnectionId::new();
        let (ops, submissions) = SocketOps::channel(id);
        Self {
            id,
            stream,
            peer,
            session,
            outbound: Outbound::new(id),
            submissions,
            ops,
            buffer,
            reading: true,
            stop,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Drive the connection to completion inside its tracing span.
    pub async fn run(self) {
        let span = tracing::info_span!(
            "connection",
            connection = %self.id,
            endpoint = %self.session.endpoint_name(),
            peer = %self.peer,
        );
        self.serve().instrument(span).await
    }

    async fn serve(mut self) {
        let endpoint = self.session.endpoint_name().to_string();
        metrics::connection_opened(&endpoint);
        tracing::debug!("Connection accepted");

        let ended = loop {
            let interest = self.interest();
            tokio::select! {
                _ = self.stop.wait() => break Ended::Stopped,
                Some(submission) = self.submissions.recv() => {
                    self.outbound.push(submission);
                    if let Some(ended) = self.flush().await {
                        break ended;
                    }
                }
                ready = self.stream.ready(interest.unwrap_or(Interest::READABLE)), if interest.is_some() => {
                    let ready = match ready {
                        Ok(ready) => ready,
                        Err(e) => {
                            tracing::debug!(error = %e, "Readiness wait failed");
                            break Ended::ReadFailed;
                        }
                    };
                    if ready.is_readable() && self.reading {
                        if let Some(ended) = self.read_ready() {
                            break ended;
                        }
                    }
                    if ready.is_writable() {
                        if let Some(ended) = self.flush().await {
                            break ended;
                        }
                    }
                }
            }
        };

        tracing::debug!(
            reason = ended.as_str(),
            pending_jobs = self.outbound.pending_jobs(),
            "Connection finished"
        );
        metrics::connection_closed(&endpoint);
    }

    fn interest(&self) -> Option<Interest> {
        match (self.reading, self.outbound.wants_write()) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    fn read_ready(&mut self) -> Option<Ended> {
        let buffer = Rc::clone(&self.buffer);
        let mut buffer = buffer.borrow_mut();
        match self.stream.try_read(&mut buffer[..]) {
            Ok(0) => Some(Ended::PeerClosed),
            Ok(n) => {
                let ctx = RequestContext::new(self.id, self.ops.clone());
                if self.session.read(&ctx, &buffer[..n]) == Disposition::Close {
                    self.reading = false;
                }
                None
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
            Err(e) => {
                tracing::debug!(error = %e, "Read failed");
                Some(Ended::ReadFailed)
            }
        }
    }

    async fn flush(&mut self) -> Option<Ended> {
        match self.outbound.flush(&mut self.stream) {
            Flush::Idle | Flush::Blocked => None,
            Flush::Close => {
                let result = self.stream.shutdown().await;
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "Socket shutdown failed");
                }
                self.outbound.closed(result);
                Some(Ended::Closed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_id_displays_as_uuid() {
        let id = ConnectionId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(Uuid::parse_str(&text).unwrap(), *id.as_uuid());
    }

    #[test]
    fn read_buffer_is_bounded() {
        let buffer = read_buffer();
        assert_eq!(buffer.borrow().len(), READ_BUFFER_SIZE);
    }
}
