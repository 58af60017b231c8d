//! Mail table gateway library.
//!
//! Speaks the tcp-lookup, socketmap and policy delegation protocols of a
//! mail transfer agent and answers each request through an HTTP backend.

pub mod backend;
pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;

pub use backend::{Backend, ReqwestClient, RestClient};
pub use config::{EndpointRegistry, GatewayConfig};
pub use lifecycle::Shutdown;
pub use net::EventLoop;
