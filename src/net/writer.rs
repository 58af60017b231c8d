//! Outbound byte transmission for a single connection.
//!
//! # Responsibilities
//! - Drain one payload across as many write-ready events as it takes
//! - Keep submitted jobs in FIFO order; only the front job's current write is
//!   active at any time
//! - Hold slotted jobs back until every earlier slot has been filled
//! - Settle every job's continuation exactly once, including jobs abandoned
//!   when the connection goes away
//!
//! Lives entirely on the loop thread.

use std::collections::{BTreeMap, VecDeque};
use std::io;

use bytes::Bytes;

use super::connection::ConnectionId;
use super::ops::{Continuation, OpError, SocketOp, Submission};

/// Non-blocking byte sink.
pub trait WriteSink {
    /// Write some bytes without blocking; `WouldBlock` means "not now".
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl WriteSink for tokio::net::TcpStream {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

/// Progress of a [`Writer`] after a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Every byte has been handed to the sink.
    Complete,
    /// The sink is full; wait for the next write-ready event.
    Blocked,
}

/// A payload and how much of it has been written.
///
/// `offset + remaining() == payload.len()` at all times.
#[derive(Debug)]
pub struct Writer {
    payload: Bytes,
    offset: usize,
}

impl Writer {
    pub fn new(payload: Bytes) -> Self {
        Self { payload, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Write as much as the sink accepts.
    pub fn drain<S: WriteSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<WriteProgress> {
        while !self.is_complete() {
            match sink.try_write(&self.payload[self.offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ))
                }
                Ok(written) => self.offset += written,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Blocked)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(WriteProgress::Complete)
    }
}

/// Result of [`Outbound::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Nothing left to write.
    Idle,
    /// Waiting for the socket to become writable again.
    Blocked,
    /// The front job asks for the socket to be closed now.
    Close,
}

struct Job {
    connection: ConnectionId,
    ops: VecDeque<SocketOp>,
    error: Option<OpError>,
    continuation: Option<Continuation>,
}

impl Job {
    fn new(connection: ConnectionId, submission: Submission) -> Self {
        let (ops, continuation) = submission.into_parts();
        Self {
            connection,
            ops: ops.into(),
            error: None,
            continuation: Some(continuation),
        }
    }

    fn fail(&mut self, err: OpError) {
        self.error = Some(match self.error.take() {
            Some(first) => first.combine(err),
            None => err,
        });
    }

    fn settle(&mut self) {
        if let Some(continuation) = self.continuation.take() {
            continuation(self.error.take().map_or(Ok(()), Err));
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.continuation.is_some() {
            self.fail(OpError::ConnectionClosed(self.connection));
            self.settle();
        }
    }
}

/// FIFO of pending jobs plus the active writer.
pub struct Outbound {
    connection: ConnectionId,
    jobs: VecDeque<Job>,
    active: Option<Writer>,
    next_slot: u64,
    parked: BTreeMap<u64, Submission>,
}

impl Outbound {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            jobs: VecDeque::new(),
            active: None,
            next_slot: 0,
            parked: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, submission: Submission) {
        match submission.slot() {
            None => self.enqueue(submission),
            Some(slot) if slot == self.next_slot => {
                self.enqueue(submission);
                self.next_slot += 1;
                while let Some(next) = self.parked.remove(&self.next_slot) {
                    self.enqueue(next);
                    self.next_slot += 1;
                }
            }
            Some(slot) => {
                self.parked.insert(slot, submission);
            }
        }
    }

    fn enqueue(&mut self, submission: Submission) {
        if submission.ops().is_empty() {
            submission.complete(Ok(()));
        } else {
            self.jobs.push_back(Job::new(self.connection, submission));
        }
    }

    /// Whether the connection needs write readiness.
    pub fn wants_write(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len() + self.parked.len()
    }

    /// Advance the queue as far as the sink allows.
    pub fn flush<S: WriteSink + ?Sized>(&mut self, sink: &mut S) -> Flush {
        loop {
            let Some(job) = self.jobs.front_mut() else {
                return Flush::Idle;
            };

            if let Some(writer) = self.active.as_mut() {
                match writer.drain(sink) {
                    Ok(WriteProgress::Blocked) => return Flush::Blocked,
                    Ok(WriteProgress::Complete) => {}
                    Err(e) => {
                        tracing::debug!(
                            connection = %self.connection,
                            written = writer.offset(),
                            remaining = writer.remaining(),
                            error = %e,
                            "Write failed"
                        );
                        job.fail(OpError::Write(e));
                    }
                }
                self.active = None;
                continue;
            }

            match job.ops.pop_front() {
                Some(SocketOp::Write(payload)) => self.active = Some(Writer::new(payload)),
                Some(SocketOp::Close) => return Flush::Close,
                None => {
                    if let Some(mut done) = self.jobs.pop_front() {
                        done.settle();
                    }
                }
            }
        }
    }

    /// Settle the job that requested the close with the shutdown result.
    /// Every later job observes a closed connection.
    pub fn closed(&mut self, result: io::Result<()>) {
        self.active = None;
        if let Some(mut job) = self.jobs.pop_front() {
            if let Err(e) = result {
                job.fail(OpError::Close(e));
            }
            if !job.ops.is_empty() {
                job.fail(OpError::ConnectionClosed(self.connection));
            }
            job.settle();
        }
        self.jobs.clear();
        self.abandon_parked();
    }

    fn abandon_parked(&mut self) {
        for (_, submission) in std::mem::take(&mut self.parked) {
            drop(Job::new(self.connection, submission));
        }
    }
}

impl Drop for Outbound {
    fn drop(&mut self) {
        self.abandon_parked();
    }
}
