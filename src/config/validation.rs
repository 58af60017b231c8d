//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check uniqueness (endpoint names, bind addresses)
//! - Validate value ranges (timeouts > 0, usable separators, http targets)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{Endpoint, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("user-agent must not be empty")]
    EmptyUserAgent,

    #[error("endpoint #{0} has an empty name")]
    EmptyName(usize),

    #[error("endpoint name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("endpoint '{name}' binds {address}, which is already taken")]
    DuplicateBinding { name: String, address: SocketAddr },

    #[error("endpoint '{name}' target must be an http or https URL, got scheme '{scheme}'")]
    UnsupportedTarget { name: String, scheme: String },

    #[error("endpoint '{0}' request-timeout must be greater than zero")]
    ZeroTimeout(String),

    #[error("endpoint '{0}' list-separator must be non-empty and free of control characters")]
    InvalidSeparator(String),

    #[error("metrics-address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check the whole configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.user_agent.trim().is_empty() {
        errors.push(ValidationError::EmptyUserAgent);
    }
    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    if let Some(address) = &config.metrics_address {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(address.clone()));
        }
    }

    let mut names = HashSet::new();
    let mut bindings = HashSet::new();
    for (index, endpoint) in config.endpoints.iter().enumerate() {
        validate_endpoint(index, endpoint, &mut errors);

        if !endpoint.name.is_empty() && !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::DuplicateName(endpoint.name.clone()));
        }
        // Port 0 asks for an ephemeral port, so it never collides.
        if endpoint.bind_port != 0 && !bindings.insert(endpoint.socket_addr()) {
            errors.push(ValidationError::DuplicateBinding {
                name: endpoint.name.clone(),
                address: endpoint.socket_addr(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_endpoint(index: usize, endpoint: &Endpoint, errors: &mut Vec<ValidationError>) {
    if endpoint.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName(index));
    }
    let scheme = endpoint.target.scheme();
    if scheme != "http" && scheme != "https" {
        errors.push(ValidationError::UnsupportedTarget {
            name: endpoint.name.clone(),
            scheme: scheme.to_string(),
        });
    }
    if endpoint.request_timeout == 0 {
        errors.push(ValidationError::ZeroTimeout(endpoint.name.clone()));
    }
    if endpoint.list_separator.is_empty() || endpoint.list_separator.chars().any(char::is_control) {
        errors.push(ValidationError::InvalidSeparator(endpoint.name.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Mode;

    fn config(endpoints: Vec<Endpoint>) -> GatewayConfig {
        GatewayConfig {
            user_agent: "gateway/test".to_string(),
            metrics_address: None,
            endpoints,
        }
    }

    fn endpoint(name: &str, port: u16) -> Endpoint {
        Endpoint {
            bind_port: port,
            ..Endpoint::for_tests(name, Mode::TcpLookup)
        }
    }

    #[test]
    fn valid_config_passes() {
        let cfg = config(vec![endpoint("a", 9000), endpoint("b", 9001)]);
        assert_eq!(validate_config(&cfg), Ok(()));
    }

    #[test]
    fn duplicates_are_reported() {
        let cfg = config(vec![endpoint("a", 9000), endpoint("a", 9000)]);
        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateName("a".to_string())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateBinding { .. })));
    }

    #[test]
    fn ephemeral_ports_never_collide() {
        let cfg = config(vec![endpoint("a", 0), endpoint("b", 0)]);
        assert_eq!(validate_config(&cfg), Ok(()));
    }

    #[test]
    fn every_problem_is_collected() {
        let mut bad = endpoint("", 9000);
        bad.request_timeout = 0;
        bad.list_separator = "\t".to_string();
        bad.target = "ftp://backend/table".parse().unwrap();
        let mut cfg = config(vec![bad]);
        cfg.metrics_address = Some("nowhere".to_string());
        cfg.user_agent = " ".to_string();

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.contains(&ValidationError::EmptyName(0)));
        assert!(errors.contains(&ValidationError::EmptyUserAgent));
        assert!(errors.contains(&ValidationError::InvalidMetricsAddress("nowhere".into())));
    }

    #[test]
    fn multi_character_separator_is_allowed() {
        let mut ep = endpoint("a", 9000);
        ep.list_separator = ", ".to_string();
        assert_eq!(validate_config(&config(vec![ep])), Ok(()));
    }
}
