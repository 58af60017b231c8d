//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, TCP_NODELAY)
//!     → connection.rs (read readiness → protocol session → handler)
//!
//! Backend completion (any thread)
//!     → ops.rs (SocketOps::submit → unbounded queue, wakes the connection)
//!     → writer.rs (FIFO of jobs, partial writes drained on write readiness)
//!
//! Everything above runs on the loop thread started by event_loop.rs.
//! ```
//!
//! # Design Decisions
//! - One loop thread owns every socket; no locks guard connection state
//! - The only cross-thread path into a connection is its submission queue
//! - At most one writer is active per connection; later jobs wait in order
//! - Replies keep request order through slots reserved at dispatch time

pub mod connection;
pub mod event_loop;
pub mod listener;
pub mod ops;
pub mod writer;

pub use connection::ConnectionId;
pub use event_loop::{EventLoop, LoopError, StartupError};
pub use listener::BoundEndpoint;
pub use ops::{Continuation, OpError, ReplySlot, SocketOp, SocketOps};
