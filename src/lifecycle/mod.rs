//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Start event loop (binds every endpoint)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Trigger stop → Accept loops and connections end → Loop thread joins
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger stop
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Stop is a single watch value; subscribers created after the trigger
//!   still observe it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
