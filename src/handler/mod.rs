//! Request handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (loop thread)
//!     → Session::read (protocol reader yields frames)
//!     → RequestHandler::handle (one backend call per request)
//!     → completion on the backend executor
//!     → outcome.rs (classification) → protocol reply → SocketOps
//! ```
//!
//! # Design Decisions
//! - The handler set is closed: one enum variant per endpoint mode
//! - `handle` only launches the backend call and returns immediately
//! - A broken frame gets a protocol-specific fatal reply and stops reading
//! - Every request reserves its reply slot before the backend call starts,
//!   so replies leave in request order
//! - Replies are written at most twice: the reply itself and, if that
//!   write fails, one short error notice

pub mod outcome;
pub mod policy;
pub mod socketmap;
pub mod tcp_lookup;

use std::sync::Arc;

use bytes::Bytes;

use crate::backend::Backend;
use crate::config::{Endpoint, Mode};
use crate::net::{ConnectionId, OpError, ReplySlot, SocketOps};
use crate::observability::metrics;
use crate::protocol::{Frame, FrameReader, LineReader, NetstringReader, PolicyReader};

pub use policy::PolicyHandler;
pub use socketmap::SocketmapHandler;
pub use tcp_lookup::TcpLookupHandler;

/// Whether the connection keeps reading after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// What a handler needs to know about the connection a request came from.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: ConnectionId,
    ops: SocketOps,
}

impl RequestContext {
    pub fn new(id: ConnectionId, ops: SocketOps) -> Self {
        Self { id, ops }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn ops(&self) -> &SocketOps {
        &self.ops
    }
}

/// Protocol-specific request processing.
pub trait RequestHandler {
    type Request;

    fn endpoint(&self) -> &Endpoint;

    /// Launch processing of one complete request.
    fn handle(&self, ctx: &RequestContext, request: Self::Request) -> Disposition;

    /// Answer a request that could not be framed or parsed, then close.
    fn reject(&self, ctx: &RequestContext, reason: &str);
}

/// The handler bound to an endpoint, chosen by its mode.
#[derive(Debug, Clone)]
pub enum Handler {
    TcpLookup(TcpLookupHandler),
    Socketmap(SocketmapHandler),
    Policy(PolicyHandler),
}

impl Handler {
    pub fn new(endpoint: Arc<Endpoint>, backend: Backend) -> Self {
        match endpoint.mode {
            Mode::TcpLookup => Handler::TcpLookup(TcpLookupHandler::new(endpoint, backend)),
            Mode::SocketmapLookup => Handler::Socketmap(SocketmapHandler::new(endpoint, backend)),
            Mode::Policy => Handler::Policy(PolicyHandler::new(endpoint, backend)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Handler::TcpLookup(h) => h.endpoint(),
            Handler::Socketmap(h) => h.endpoint(),
            Handler::Policy(h) => h.endpoint(),
        }
    }

    /// Pair the handler with a fresh protocol reader for a new connection.
    pub fn open_session(&self) -> Session {
        match self {
            Handler::TcpLookup(h) => Session::TcpLookup(h.clone(), LineReader::new()),
            Handler::Socketmap(h) => Session::Socketmap(h.clone(), NetstringReader::new()),
            Handler::Policy(h) => Session::Policy(h.clone(), PolicyReader::new()),
        }
    }
}

/// Per-connection protocol state.
#[derive(Debug)]
pub enum Session {
    TcpLookup(TcpLookupHandler, LineReader),
    Socketmap(SocketmapHandler, NetstringReader),
    Policy(PolicyHandler, PolicyReader),
}

impl Session {
    pub fn endpoint_name(&self) -> &str {
        match self {
            Session::TcpLookup(h, _) => &h.endpoint().name,
            Session::Socketmap(h, _) => &h.endpoint().name,
            Session::Policy(h, _) => &h.endpoint().name,
        }
    }

    /// Feed freshly read bytes; every complete request is dispatched.
    pub fn read(&mut self, ctx: &RequestContext, bytes: &[u8]) -> Disposition {
        match self {
            Session::TcpLookup(handler, reader) => drive(handler, reader, ctx, bytes),
            Session::Socketmap(handler, reader) => drive(handler, reader, ctx, bytes),
            Session::Policy(handler, reader) => drive(handler, reader, ctx, bytes),
        }
    }
}

fn drive<H, R>(handler: &H, reader: &mut R, ctx: &RequestContext, mut input: &[u8]) -> Disposition
where
    H: RequestHandler,
    R: FrameReader<Request = H::Request>,
{
    loop {
        match reader.next_frame(&mut input) {
            Frame::Pending => return Disposition::Continue,
            Frame::Complete(request) => {
                if handler.handle(ctx, request) == Disposition::Close {
                    return Disposition::Close;
                }
            }
            Frame::Broken(reason) => {
                let endpoint = &handler.endpoint().name;
                tracing::warn!(endpoint = %endpoint, reason = %reason, "Broken request");
                metrics::framing_error(endpoint);
                handler.reject(ctx, &reason);
                return Disposition::Close;
            }
        }
    }
}

/// Fill `slot` with `reply`; if writing it fails, send `notice` once and close.
pub(crate) fn deliver(slot: ReplySlot, reply: Bytes, close: bool, notice: Bytes) {
    let retry = slot.ops().clone();
    let continuation = Box::new(move |result: Result<(), OpError>| {
        let Err(err) = result else { return };
        if err.is_connection_closed() {
            tracing::debug!(
                connection = %retry.connection_id(),
                "Reply dropped, connection already closed"
            );
            return;
        }
        tracing::warn!(
            connection = %retry.connection_id(),
            error = %err,
            "Failed to send reply, sending error notice"
        );
        let connection = retry.connection_id();
        retry.write_and_close(
            notice,
            Box::new(move |result: Result<(), OpError>| match result {
                Ok(()) => {}
                Err(e) if e.is_connection_closed() => {
                    tracing::debug!(connection = %connection, "Error notice dropped, connection closed");
                }
                Err(e) => {
                    tracing::warn!(connection = %connection, error = %e, "Failed to send error notice");
                }
            }),
        );
    });

    if close {
        slot.write_and_close(reply, continuation);
    } else {
        slot.write(reply, continuation);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving handlers without sockets.

    use std::time::Duration;

    use crate::net::ops::{SocketOp, Submission, SubmissionQueue};

    /// Wait for the next submission and settle it successfully.
    pub async fn next_ops(queue: &mut SubmissionQueue) -> Vec<SocketOp> {
        let submission: Submission = tokio::time::timeout(Duration::from_secs(2), queue.recv())
            .await
            .expect("no submission within 2s")
            .expect("queue closed");
        let ops = submission.ops().to_vec();
        submission.complete(Ok(()));
        ops
    }

    /// The single payload of a write-only or write-and-close job.
    pub fn payload(ops: &[SocketOp]) -> String {
        match ops.first() {
            Some(SocketOp::Write(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            other => panic!("expected a write, got {other:?}"),
        }
    }

    pub fn closes(ops: &[SocketOp]) -> bool {
        ops.last() == Some(&SocketOp::Close)
    }
}
