//! Listening sockets and accept loops.
//!
//! # Responsibilities
//! - Bind every configured endpoint before the loop thread starts
//! - Accept incoming TCP connections and disable send delay on them
//! - Hand each accepted socket to a connection task bound to the
//!   endpoint's handler
//! - Keep accepting after transient accept errors

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::connection::{Connection, ReadBuffer};
use super::event_loop::StartupError;
use crate::config::{Endpoint, Mode};
use crate::handler::Handler;
use crate::lifecycle::ShutdownSignal;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop thread.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Public description of a bound endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundEndpoint {
    pub name: String,
    pub mode: Mode,
    pub local_addr: SocketAddr,
}

/// A listener registered with the loop's reactor, not yet accepting.
pub struct Listener {
    endpoint: Arc<Endpoint>,
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind the endpoint's address. Must run inside the loop runtime's
    /// context so the socket registers with its reactor.
    pub fn bind(endpoint: &Arc<Endpoint>) -> Result<Self, StartupError> {
        let address = endpoint.socket_addr();
        let bind_error = |source| StartupError::Bind {
            endpoint: endpoint.name.clone(),
            address,
            source,
        };

        let std_listener = std::net::TcpListener::bind(address).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = std_listener.local_addr().map_err(bind_error)?;
        let inner = TcpListener::from_std(std_listener).map_err(bind_error)?;

        tracing::info!(
            endpoint = %endpoint.name,
            mode = %endpoint.mode,
            address = %local_addr,
            "Listener bound"
        );

        Ok(Self {
            endpoint: Arc::clone(endpoint),
            inner,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn describe(&self) -> BoundEndpoint {
        BoundEndpoint {
            name: self.endpoint.name.clone(),
            mode: self.endpoint.mode,
            local_addr: self.local_addr,
        }
    }

    /// Accept until stopped, spawning one local task per connection.
    pub async fn accept_loop(self, handler: Handler, buffer: ReadBuffer, mut stop: ShutdownSignal) {
        loop {
            let accepted = tokio::select! {
                _ = stop.wait() => break,
                accepted = self.inner.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(
                        endpoint = %self.endpoint.name,
                        error = %e,
                        "Failed to accept connection"
                    );
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let connection = Connection::new(
                stream,
                peer,
                handler.open_session(),
                Rc::clone(&buffer),
                stop.clone(),
            );
            tokio::task::spawn_local(connection.run());
        }

        tracing::debug!(endpoint = %self.endpoint.name, "Accept loop stopped");
    }
}
