//! Classification of backend results.
//!
//! Pure functions of status and body. An empty 2xx body means "not found"
//! for lookups.

use crate::backend::json::decode_string_list;
use crate::backend::{BackendError, BackendResponse};

/// Classified result of a lookup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Vec<String>),
    NotFound,
    ClientError(u16),
    ServerError(u16),
    Unexpected(u16),
    InvalidData,
    Timeout(BackendError),
    Transport(BackendError),
}

impl LookupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "found",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::ClientError(_) => "client_error",
            LookupOutcome::ServerError(_) => "server_error",
            LookupOutcome::Unexpected(_) => "unexpected_status",
            LookupOutcome::InvalidData => "invalid_data",
            LookupOutcome::Timeout(_) => "timeout",
            LookupOutcome::Transport(_) => "transport_error",
        }
    }
}

/// Classified result of a policy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Action(String),
    InvalidData,
    ClientError(u16),
    ServerError(u16),
    Unexpected(u16),
    Timeout(BackendError),
    Transport(BackendError),
}

impl PolicyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyOutcome::Action(_) => "action",
            PolicyOutcome::InvalidData => "invalid_data",
            PolicyOutcome::ClientError(_) => "client_error",
            PolicyOutcome::ServerError(_) => "server_error",
            PolicyOutcome::Unexpected(_) => "unexpected_status",
            PolicyOutcome::Timeout(_) => "timeout",
            PolicyOutcome::Transport(_) => "transport_error",
        }
    }
}

fn failure<T>(error: BackendError, timeout: fn(BackendError) -> T, transport: fn(BackendError) -> T) -> T {
    if error.is_timeout() {
        timeout(error)
    } else {
        transport(error)
    }
}

pub fn classify_lookup(result: Result<BackendResponse, BackendError>) -> LookupOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return failure(e, LookupOutcome::Timeout, LookupOutcome::Transport),
    };

    match response.status {
        200..=299 => {
            if response.body.trim().is_empty() {
                return LookupOutcome::NotFound;
            }
            match decode_string_list(&response.body) {
                Ok(values) if values.is_empty() => LookupOutcome::NotFound,
                Ok(values) => LookupOutcome::Found(values),
                Err(_) => LookupOutcome::InvalidData,
            }
        }
        404 => LookupOutcome::NotFound,
        400..=499 => LookupOutcome::ClientError(response.status),
        500..=599 => LookupOutcome::ServerError(response.status),
        status => LookupOutcome::Unexpected(status),
    }
}

pub fn classify_policy(result: Result<BackendResponse, BackendError>) -> PolicyOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return failure(e, PolicyOutcome::Timeout, PolicyOutcome::Transport),
    };

    match response.status {
        200..=299 => {
            let action = response.body.trim();
            if action.is_empty() || action.contains(['\n', '\r']) {
                PolicyOutcome::InvalidData
            } else {
                PolicyOutcome::Action(action.to_string())
            }
        }
        400..=499 => PolicyOutcome::ClientError(response.status),
        500..=599 => PolicyOutcome::ServerError(response.status),
        status => PolicyOutcome::Unexpected(status),
    }
}
