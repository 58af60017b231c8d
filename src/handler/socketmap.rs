//! socketmap-lookup request handling.

use std::sync::Arc;

use bytes::Bytes;

use super::outcome::{classify_lookup, LookupOutcome};
use super::{deliver, Disposition, RequestContext, RequestHandler};
use crate::backend::{Backend, BackendRequest};
use crate::config::Endpoint;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::netstring;
use crate::protocol::socketmap::{parse_request, SocketmapReply};

const PROBLEM: &str = "REST connector encountered a problem!";

#[derive(Debug, Clone)]
pub struct SocketmapHandler {
    endpoint: Arc<Endpoint>,
    backend: Backend,
}

impl SocketmapHandler {
    pub fn new(endpoint: Arc<Endpoint>, backend: Backend) -> Self {
        Self { endpoint, backend }
    }
}

impl RequestHandler for SocketmapHandler {
    type Request = String;

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn handle(&self, ctx: &RequestContext, payload: String) -> Disposition {
        let Some((name, key)) = parse_request(&payload) else {
            self.reject(ctx, "missing space between map name and key");
            return Disposition::Close;
        };

        let request = BackendRequest::lookup(&self.endpoint, ctx.id())
            .with_query("name", &name)
            .with_query("key", &key);
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
        let reply = SocketmapReply::Perm(format!("{} - Broken request! ({})", ctx.id(), reason));
        deliver(
            ctx.ops().reserve(),
            reply.encode().unwrap_or_else(|_| problem_reply(ctx.id())),
            true,
            problem_reply(ctx.id()),
        );
    }
}

fn reply_for(endpoint: &Endpoint, id: ConnectionId, outcome: &LookupOutcome) -> (Bytes, bool) {
    let (reply, close) = match outcome {
        LookupOutcome::Found(values) => {
            (SocketmapReply::Ok(values.join(endpoint.list_separator.as_str())), false)
        }
        LookupOutcome::NotFound => (SocketmapReply::NotFound, false),
        LookupOutcome::ClientError(status) => (
            SocketmapReply::Perm(format!(
                "{} - REST server signaled a user error, is the connector misconfigured? Code: {}",
                id, status
            )),
            true,
        ),
        LookupOutcome::ServerError(status) => (
            SocketmapReply::Temp(format!("{} - REST server had an internal error: {}", id, status)),
            false,
        ),
        LookupOutcome::Unexpected(status) => (
            SocketmapReply::Temp(format!(
                "{} - REST server responded with an unspecified code: {}",
                id, status
            )),
            false,
        ),
        LookupOutcome::InvalidData => (
            SocketmapReply::Temp(format!("{} - REST connector received invalid data!", id)),
            false,
        ),
        LookupOutcome::Timeout(_) => (
            SocketmapReply::Timeout(format!("{} - REST request timed out", id)),
            false,
        ),
        LookupOutcome::Transport(e) => (SocketmapReply::Temp(format!("{} - {}", id, e)), false),
    };

    match reply.encode() {
        Ok(bytes) => (bytes, close),
        Err(e) => {
            tracing::error!(
                connection = %id,
                endpoint = %endpoint.name,
                error = %e,
                "socketmap reply too long"
            );
            (problem_reply(id), true)
        }
    }
}

fn problem_reply(id: ConnectionId) -> Bytes {
    let reply = SocketmapReply::Temp(format!("{} - {}", id, PROBLEM));
    Bytes::from(netstring::encode(&reply.payload()))
}
