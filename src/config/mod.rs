//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → registry.rs (endpoints shared via Arc with the event loop)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - Optional fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod registry;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use registry::EndpointRegistry;
pub use schema::{Endpoint, GatewayConfig, Mode};
pub use validation::ValidationError;
