//! Policy delegation request handling.
//!
//! One POST per paragraph; the trimmed response body becomes the action.
//! 4xx answers keep the connection open; transport failures close it.

use std::sync::Arc;

use bytes::Bytes;

use super::outcome::{classify_policy, PolicyOutcome};
use super::{deliver, Disposition, RequestContext, RequestHandler};
use crate::backend::{Backend, BackendRequest};
use crate::config::Endpoint;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::policy::format_action;
use crate::protocol::PolicyRequest;

#[derive(Debug, Clone)]
pub struct PolicyHandler {
    endpoint: Arc<Endpoint>,
    backend: Backend,
}

impl PolicyHandler {
    pub fn new(endpoint: Arc<Endpoint>, backend: Backend) -> Self {
        Self { endpoint, backend }
    }
}

impl RequestHandler for PolicyHandler {
    type Request = PolicyRequest;

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn handle(&self, ctx: &RequestContext, request: PolicyRequest) -> Disposition {
        tracing::debug!(
            connection = %ctx.id(),
            attributes = request.len(),
            state = request.get("protocol_state").unwrap_or("-"),
            client = request.get("client_address").unwrap_or("-"),
            "Policy request"
        );
        let request = BackendRequest::policy(&self.endpoint, ctx.id(), request.into_attributes());
        let endpoint = Arc::clone(&self.endpoint);
        let slot = ctx.ops().reserve();
        self.backend.dispatch(request, move |result| {
            let id = slot.ops().connection_id();
            let outcome = classify_policy(result);
            metrics::request_completed(&endpoint.name, outcome.label());
            let (reply, close) = reply_for(id, &outcome);
            deliver(slot, reply, close, problem_reply(id));
        });
        Disposition::Continue
    }

    fn reject(&self, ctx: &RequestContext, reason: &str) {
        tracing::debug!(connection = %ctx.id(), reason = %reason, "Rejecting request");
        metrics::request_completed(&self.endpoint.name, "broken");
        let reply = format_action(&format!("554 {} - Broken request! ({})", ctx.id(), reason));
        deliver(ctx.ops().reserve(), reply, true, problem_reply(ctx.id()));
    }
}

fn reply_for(id: ConnectionId, outcome: &PolicyOutcome) -> (Bytes, bool) {
    match outcome {
        PolicyOutcome::Action(action) => (format_action(action), false),
        PolicyOutcome::InvalidData => (
            format_action(&format!("451 {} - REST connector received invalid data!", id)),
            false,
        ),
        PolicyOutcome::ClientError(_) => (
            format_action(&format!(
                "554 {} - REST server signaled a user error, is the connector misconfigured?",
                id
            )),
            false,
        ),
        PolicyOutcome::ServerError(status) | PolicyOutcome::Unexpected(status) => (
            format_action(&format!("451 {} - REST server had an internal error: {}", id, status)),
            false,
        ),
        PolicyOutcome::Timeout(e) | PolicyOutcome::Transport(e) => {
            (format_action(&format!("451 {} - {}", id, e)), true)
        }
    }
}

fn problem_reply(id: ConnectionId) -> Bytes {
    format_action(&format!("451 {} - REST connector encountered a problem!", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::StubClient;
    use crate::backend::{BackendError, Method};
    use crate::config::Mode;
    use crate::handler::testing::{closes, next_ops, payload};
    use crate::net::ops::SubmissionQueue;
    use crate::net::SocketOps;
    use tokio::runtime::Handle;

    fn setup(stub: &Arc<StubClient>) -> (PolicyHandler, RequestContext, SubmissionQueue) {
        let backend = Backend::new(stub.clone(), Handle::current());
        let endpoint = Endpoint::for_tests("policy", Mode::Policy);
        let handler = PolicyHandler::new(Arc::new(endpoint), backend);
        let id = ConnectionId::new();
        let (ops, queue) = SocketOps::channel(id);
        (handler, RequestContext::new(id, ops), queue)
    }

    fn paragraph() -> PolicyRequest {
        PolicyRequest::new(vec![
            ("request".to_string(), "smtpd_access_policy".to_string()),
            ("sender".to_string(), "a@b".to_string()),
        ])
    }

    #[tokio::test]
    async fn action_is_trimmed_body() {
        let stub = StubClient::status(200, "DUNNO\n");
        let (handler, ctx, mut queue) = setup(&stub);
        assert_eq!(handler.handle(&ctx, paragraph()), Disposition::Continue);

        let reply = next_ops(&mut queue).await;
        assert_eq!(payload(&reply), "action=DUNNO\n\n");
        assert!(!closes(&reply));

        let request = &stub.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.form, paragraph().into_attributes());
        assert_eq!(request.trace_id, ctx.id().to_string());
    }

    #[tokio::test]
    async fn client_error_keeps_connection_open() {
        let stub = StubClient::status(400, "bad");
        let (handler, ctx, mut queue) = setup(&stub);
        handler.handle(&ctx, paragraph());

        let reply = next_ops(&mut queue).await;
        assert!(!closes(&reply));
        assert_eq!(
            payload(&reply),
            format!(
                "action=554 {} - REST server signaled a user error, is the connector misconfigured?\n\n",
                ctx.id()
            )
        );
    }

    #[tokio::test]
    async fn server_error_is_deferred() {
        let stub = StubClient::status(503, "");
        let (handler, ctx, mut queue) = setup(&stub);
        handler.handle(&ctx, paragraph());
        assert_eq!(
            payload(&next_ops(&mut queue).await),
            format!("action=451 {} - REST server had an internal error: 503\n\n", ctx.id())
        );
    }

    #[tokio::test]
    async fn transport_error_closes() {
        let stub = StubClient::failing(BackendError::Connect("refused".into()));
        let (handler, ctx, mut queue) = setup(&stub);
        handler.handle(&ctx, paragraph());

        let reply = next_ops(&mut queue).await;
        assert!(closes(&reply));
        assert!(payload(&reply).starts_with(&format!("action=451 {} - ", ctx.id())));
    }

    #[tokio::test]
    async fn multi_line_body_is_invalid() {
        let stub = StubClient::status(200, "OK\nREJECT");
        let (handler, ctx, mut queue) = setup(&stub);
        handler.handle(&ctx, paragraph());
        assert!(payload(&next_ops(&mut queue).await).contains("received invalid data!"));
    }

    #[tokio::test]
    async fn broken_paragraph_is_rejected() {
        let stub = StubClient::status(200, "DUNNO");
        let (handler, ctx, mut queue) = setup(&stub);
        handler.reject(&ctx, "attribute line without '='");

        let reply = next_ops(&mut queue).await;
        assert!(closes(&reply));
        assert_eq!(
            payload(&reply),
            format!(
                "action=554 {} - Broken request! (attribute line without '=')\n\n",
                ctx.id()
            )
        );
    }
}
