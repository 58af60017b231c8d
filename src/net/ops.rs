//! Thread-safe socket operation submission.
//!
//! # Responsibilities
//! - Accept `Write`/`Close` operations from any thread
//! - Hand them to the owning connection through an unbounded channel, which
//!   also wakes the connection task on the loop thread
//! - Report each submission's outcome exactly once through its continuation
//!
//! # Design Decisions
//! - Callers never touch the socket; bytes move only on the loop thread
//! - A submission is an atomic job: its ops run back to back, nothing from
//!   another submission is interleaved
//! - Submitting to a connection that is gone fails the continuation
//!   immediately with [`OpError::ConnectionClosed`]
//! - Replies reserve a [`ReplySlot`] when their request is dispatched; the
//!   connection releases slotted jobs in reservation order, so answers leave
//!   in request order whatever order the backend finishes in

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use super::connection::ConnectionId;

/// An operation on a client socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOp {
    /// Transmit the bytes completely.
    Write(Bytes),
    /// Shut the socket down and end the connection.
    Close,
}

/// Errors reported to continuations.
#[derive(Debug, Error)]
pub enum OpError {
    /// The connection ended before the operation ran.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Writing to the socket failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// Shutting the socket down failed.
    #[error("close failed: {0}")]
    Close(#[source] io::Error),

    /// A later failure in the same job, reported together with the first one.
    #[error("{first}; then {second}")]
    Compound {
        first: Box<OpError>,
        second: Box<OpError>,
    },
}

impl OpError {
    /// Fold `later` onto `self` so neither failure is lost.
    pub fn combine(self, later: OpError) -> OpError {
        OpError::Compound {
            first: Box::new(self),
            second: Box::new(later),
        }
    }

    /// Whether every failure in this error only reports a vanished connection.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            OpError::ConnectionClosed(_) => true,
            OpError::Compound { first, second } => {
                first.is_connection_closed() && second.is_connection_closed()
            }
            _ => false,
        }
    }
}

/// Callback fired once when a submission has been fully applied.
pub type Continuation = Box<dyn FnOnce(Result<(), OpError>) + Send + 'static>;

/// A job queued for a connection.
pub struct Submission {
    ops: Vec<SocketOp>,
    slot: Option<u64>,
    continuation: Continuation,
}

impl Submission {
    pub(crate) fn new(ops: Vec<SocketOp>, continuation: Continuation) -> Self {
        Self {
            ops,
            slot: None,
            continuation,
        }
    }

    /// A job that fills a reserved reply slot.
    pub(crate) fn in_slot(slot: u64, ops: Vec<SocketOp>, continuation: Continuation) -> Self {
        Self {
            ops,
            slot: Some(slot),
            continuation,
        }
    }

    pub fn ops(&self) -> &[SocketOp] {
        &self.ops
    }

    pub fn slot(&self) -> Option<u64> {
        self.slot
    }

    pub(crate) fn into_parts(self) -> (Vec<SocketOp>, Continuation) {
        (self.ops, self.continuation)
    }

    /// Settle the submission without applying it.
    pub fn complete(self, result: Result<(), OpError>) {
        (self.continuation)(result)
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("ops", &self.ops)
            .field("slot", &self.slot)
            .finish()
    }
}

/// Receiving side of a connection's submission queue.
pub type SubmissionQueue = mpsc::UnboundedReceiver<Submission>;

/// Handle for queueing socket operations, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct SocketOps {
    connection: ConnectionId,
    tx: mpsc::UnboundedSender<Submission>,
    slots: Arc<AtomicU64>,
}

impl SocketOps {
    /// Create a handle and the queue the owning connection drains.
    pub fn channel(connection: ConnectionId) -> (Self, SubmissionQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ops = Self {
            connection,
            tx,
            slots: Arc::new(AtomicU64::new(0)),
        };
        (ops, rx)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Reserve the next reply position on this connection.
    pub fn reserve(&self) -> ReplySlot {
        ReplySlot {
            ops: self.clone(),
            seq: self.slots.fetch_add(1, Ordering::Relaxed),
            filled: false,
        }
    }

    fn send(&self, submission: Submission) {
        if let Err(mpsc::error::SendError(submission)) = self.tx.send(submission) {
            submission.complete(Err(OpError::ConnectionClosed(self.connection)));
        }
    }

    /// Queue a single operation.
    pub fn submit(&self, op: SocketOp, continuation: Continuation) {
        self.submit_all(vec![op], continuation);
    }

    /// Queue several operations as one job.
    pub fn submit_all(&self, ops: Vec<SocketOp>, continuation: Continuation) {
        self.send(Submission::new(ops, continuation));
    }

    pub fn write(&self, payload: Bytes, continuation: Continuation) {
        self.submit(SocketOp::Write(payload), continuation);
    }

    pub fn close(&self, continuation: Continuation) {
        self.submit(SocketOp::Close, continuation);
    }

    /// Write `payload`, then close. A close failure is folded onto a prior
    /// write failure.
    pub fn write_and_close(&self, payload: Bytes, continuation: Continuation) {
        self.submit_all(vec![SocketOp::Write(payload), SocketOp::Close], continuation);
    }
}

/// A reserved reply position on a connection.
///
/// Jobs of later slots wait until this one is filled. Dropping an unfilled
/// slot releases it empty.
#[derive(Debug)]
pub struct ReplySlot {
    ops: SocketOps,
    seq: u64,
    filled: bool,
}

impl ReplySlot {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn ops(&self) -> &SocketOps {
        &self.ops
    }

    pub fn write(self, payload: Bytes, continuation: Continuation) {
        self.fill(vec![SocketOp::Write(payload)], continuation);
    }

    /// Write `payload` in this slot, then close.
    pub fn write_and_close(self, payload: Bytes, continuation: Continuation) {
        self.fill(vec![SocketOp::Write(payload), SocketOp::Close], continuation);
    }

    fn fill(mut self, ops: Vec<SocketOp>, continuation: Continuation) {
        self.filled = true;
        self.ops.send(Submission::in_slot(self.seq, ops, continuation));
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        if !self.filled {
            let released = Submission::in_slot(self.seq, Vec::new(), Box::new(|_| {}));
            self.ops.send(released);
        }
    }
}
