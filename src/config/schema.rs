//! Configuration schema definitions.
//!
//! All types derive Serde traits; field names are kebab-case on disk.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// `User-Agent` sent with every backend call.
    pub user_agent: String,

    /// Prometheus scrape address; no exporter when absent.
    #[serde(default)]
    pub metrics_address: Option<String>,

    pub endpoints: Vec<Endpoint>,
}

/// Wire protocol spoken on an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    TcpLookup,
    SocketmapLookup,
    Policy,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::TcpLookup => "tcp-lookup",
            Mode::SocketmapLookup => "socketmap-lookup",
            Mode::Policy => "policy",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listening port and the backend it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Endpoint {
    pub name: String,

    /// Absolute http(s) URL requests are sent to.
    pub target: Url,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Port 0 binds an ephemeral port.
    pub bind_port: u16,

    pub auth_token: String,

    /// Per-request timeout in milliseconds.
    pub request_timeout: u64,

    pub mode: Mode,

    /// Separator placed between looked-up values.
    #[serde(default = "default_list_separator")]
    pub list_separator: String,
}

impl Endpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.bind_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str, mode: Mode) -> Self {
        Self {
            name: name.to_string(),
            target: Url::parse("http://127.0.0.1:1/lookup").unwrap(),
            bind_address: default_bind_address(),
            bind_port: 0,
            auth_token: "secret".to_string(),
            request_timeout: 1000,
            mode,
            list_separator: default_list_separator(),
        }
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_list_separator() -> String {
    " ".to_string()
}
