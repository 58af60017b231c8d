//! The I/O event loop.
//!
//! # Responsibilities
//! - Bind every endpoint up front and fail startup on the first bind error
//! - Run all accept loops and connection tasks on one dedicated thread
//! - Stop promptly on request and release every socket
//!
//! # Design Decisions
//! - The loop thread drives a current-thread Tokio runtime with a
//!   `LocalSet`, so sockets, readers and writers never cross threads
//! - Backend calls do not run here; they go to the executor carried by
//!   [`Backend`](crate::backend::Backend)
//! - The loop is an owned service object: dropping it stops the thread

use std::net::SocketAddr;
use std::rc::Rc;
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::task::LocalSet;

use super::connection::read_buffer;
use super::listener::{BoundEndpoint, Listener};
use crate::backend::Backend;
use crate::config::EndpointRegistry;
use crate::handler::Handler;
use crate::lifecycle::{Shutdown, ShutdownSignal};

const LOOP_THREAD_NAME: &str = "gateway-loop";

/// Errors raised while starting the loop.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind endpoint '{endpoint}' to {address}: {source}")]
    Bind {
        endpoint: String,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build the event loop runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn the event loop thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors raised when the loop thread ends abnormally.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("event loop thread panicked")]
    Panicked,
}

/// Handle to a running event loop.
pub struct EventLoop {
    shutdown: Shutdown,
    bound: Vec<BoundEndpoint>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Bind every endpoint of the registry and start serving them.
    pub fn start(registry: &EndpointRegistry, backend: Backend) -> Result<Self, StartupError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StartupError::Runtime)?;

        let listeners = {
            let _context = runtime.enter();
            registry
                .iter()
                .map(Listener::bind)
                .collect::<Result<Vec<_>, _>>()?
        };
        let bound = listeners.iter().map(Listener::describe).collect();

        let shutdown = Shutdown::new();
        let stop = shutdown.subscribe();
        let thread = std::thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || run(runtime, listeners, backend, stop))
            .map_err(StartupError::Spawn)?;

        Ok(Self {
            shutdown,
            bound,
            thread: Some(thread),
        })
    }

    /// Every endpoint with the address it actually listens on.
    pub fn bound(&self) -> &[BoundEndpoint] {
        &self.bound
    }

    /// Local address of the named endpoint.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.bound
            .iter()
            .find(|bound| bound.name == name)
            .map(|bound| bound.local_addr)
    }

    /// Ask the loop to stop; returns immediately.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Stop the loop and wait for its thread to finish.
    pub fn join(mut self) -> Result<(), LoopError> {
        self.shutdown.trigger();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| LoopError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn run(runtime: Runtime, listeners: Vec<Listener>, backend: Backend, mut stop: ShutdownSignal) {
    let local = LocalSet::new();
    let buffer = read_buffer();

    for listener in listeners {
        let handler = Handler::new(listener.endpoint().clone(), backend.clone());
        local.spawn_local(listener.accept_loop(handler, Rc::clone(&buffer), stop.clone()));
    }

    tracing::info!("Event loop running");
    runtime.block_on(local.run_until(async move { stop.wait().await }));
    // Remaining connections are dropped here; their pending jobs settle
    // with ConnectionClosed.
    let _context = runtime.enter();
    drop(local);
    tracing::info!("Event loop stopped");
}
