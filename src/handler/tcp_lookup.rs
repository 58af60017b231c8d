//! tcp-lookup request handling.

use std::sync::Arc;

use bytes::Bytes;

use super::outcome::{classify_lookup, LookupOutcome};
use super::{deliver, Disposition, RequestContext, RequestHandler};
use crate::backend::{Backend, BackendRequest};
use crate::config::Endpoint;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::encode_lookup_data;
use crate::protocol::tcp_lookup::{encode_values, format_encoded, format_response, parse_request, ReplyCode};

const NOT_FOUND: &str = "key not found";
const PROBLEM: &str = "REST connector encountered a problem!";

#[derive(Debug, Clone)]
pub struct TcpLookupHandler {
    endpoint: Arc<Endpoint>,
    backend: Backend,
}

impl TcpLookupHandler {
    pub fn new(endpoint: Arc<Endpoint>, backend: Backend) -> Self {
        Self { endpoint, backend }
    }
}

impl RequestHandler for TcpLookupHandler {
    type Request = String;

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn handle(&self, ctx: &RequestContext, line: String) -> Disposition {
        let Some(key) = parse_request(&line) else {
            tracing::warn!(
                connection = %ctx.id(),
                endpoint = %self.endpoint.name,
                "Request without 'get ' prefix or key"
            );
            self.reject(ctx, "malformed request line");
            return Disposition::Close;
        };

        let request = BackendRequest::lookup(&self.endpoint, ctx.id()).with_query("key", &key);
        let endpoint = Arc::clone(&self.endpoint);
        let slot = ctx.ops().reserve();
        self.backend.dispatch(request, move |result| {
            let id = slot.ops().connection_id();
            let outcome = classify_lookup(result);
            metrics::request_completed(&endpoint.name, outcome.label());
            let (reply, close) = reply_for(&endpoint, id, &outcome);
            deliver(slot, reply, close, problem_reply(id));
        });
        Disposition::Continue
    }

    fn reject(&self, ctx: &RequestContext, reason: &str) {
        tracing::debug!(connection = %ctx.id(), reason = %reason, "Rejecting request");
        metrics::request_completed(&self.endpoint.name, "broken");
        deliver(
            ctx.ops().reserve(),
            error_reply(ctx.id(), "Broken request!"),
            true,
            problem_reply(ctx.id()),
        );
    }
}

/// Wire reply for an outcome and whether the connection closes after it.
fn reply_for(endpoint: &Endpoint, id: ConnectionId, outcome: &LookupOutcome) -> (Bytes, bool) {
    let error = |message: &str| format_response(ReplyCode::Error, &format!("{} - {}", id, message));

    let (formatted, close) = match outcome {
        LookupOutcome::Found(values) => (
            format_encoded(
                ReplyCode::Success,
                &encode_values(values, &endpoint.list_separator),
            ),
            false,
        ),
        LookupOutcome::NotFound => (format_response(ReplyCode::NotFound, NOT_FOUND), false),
        LookupOutcome::ClientError(status) => (
            error(&format!(
                "REST server signaled a user error, is the connector misconfigured? Code: {}",
                status
            )),
            true,
        ),
        LookupOutcome::ServerError(status) => (
            error(&format!("REST server had an internal error: {}", status)),
            false,
        ),
        LookupOutcome::Unexpected(status) => (
            error(&format!(
                "REST server responded with an unspecified code: {}",
                status
            )),
            false,
        ),
        LookupOutcome::InvalidData => (error("REST connector received invalid data!"), false),
        LookupOutcome::Timeout(e) | LookupOutcome::Transport(e) => (error(&e.to_string()), false),
    };

    match formatted {
        Ok(reply) => (reply, close),
        Err(e) => {
            tracing::error!(
                connection = %id,
                endpoint = %endpoint.name,
                error = %e,
                "Lookup reply too long"
            );
            (problem_reply(id), true)
        }
    }
}

/// `400 <id> - <message>`, falling back to the generic problem reply when
/// the message would overflow the reply limit.
fn error_reply(id: ConnectionId, message: &str) -> Bytes {
    format_response(ReplyCode::Error, &format!("{} - {}", id, message))
        .unwrap_or_else(|_| problem_reply(id))
}

fn problem_reply(id: ConnectionId) -> Bytes {
    let data = encode_lookup_data(&format!("{} - {}", id, PROBLEM));
    Bytes::from(format!("{} {}\n", ReplyCode::Error.as_u16(), data))
}
