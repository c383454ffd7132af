use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use pathlink_core::error::{PathlinkError, Result};
use pathlink_core::protocol::{subject, Envelope, ErrorReply, InnerRequest, InnerResponse};

use crate::obs::ClientMetrics;

/// Serves one registered path.
#[async_trait]
pub trait PathHandler: Send + Sync {
    fn path(&self) -> &str;
    async fn handle(&self, req: InnerRequest) -> Result<InnerResponse>;
}

/// Path -> handler registry; consumes inbound envelopes in receipt order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<String, Arc<dyn PathHandler>>,
    metrics: Arc<ClientMetrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<ClientMetrics>) -> Self {
        Self {
            handlers: DashMap::new(),
            metrics,
        }
    }

    pub fn register(&self, handler: Arc<dyn PathHandler>) {
        self.handlers.insert(handler.path().to_string(), handler);
    }

    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Route an inner request to its path handler.
    pub async fn dispatch(&self, req: InnerRequest) -> Result<InnerResponse> {
        let handler = self
            .handlers
            .get(req.path.as_str())
            .ok_or_else(|| PathlinkError::UnknownPath(req.path.clone()))?
            .value()
            .clone();
        handler.handle(req).await
    }

    /// Handle one inbound envelope. Returns the reply to send, if any.
    pub async fn on_envelope(&self, env: Envelope) -> Option<Envelope> {
        match env.sub.as_str() {
            subject::REQUEST => self.on_request(env).await,
            subject::REG_RESPONSE => {
                match env.msg_bytes() {
                    Ok(msg) => tracing::info!(
                        request = env.request,
                        msg = %String::from_utf8_lossy(&msg),
                        "registration acknowledged"
                    ),
                    Err(e) => tracing::warn!(error = %e, "registration ack with unreadable msg"),
                }
                None
            }
            subject::TASK => {
                tracing::info!(request = env.request, len = env.msg.len(), "task notification");
                None
            }
            other => {
                tracing::warn!(sub = other, request = env.request, "ignoring unknown subject");
                None
            }
        }
    }

    async fn on_request(&self, env: Envelope) -> Option<Envelope> {
        let correlation = env.request;

        let result = match env.inner_request() {
            Ok(req) => {
                tracing::debug!(request = correlation, method = %req.method, path = %req.path, "dispatching");
                self.dispatch(req).await
            }
            Err(e) => Err(e),
        };

        let reply = match result {
            Ok(resp) => {
                self.metrics.dispatch.inc(&[("outcome", subject::RESPONSE)]);
                resp.into_envelope()
            }
            Err(e) => {
                self.metrics.dispatch.inc(&[("outcome", subject::ERROR)]);
                tracing::warn!(request = correlation, kind = e.kind().as_str(), error = %e, "request failed");
                ErrorReply::from_error(correlation, &e).into_envelope()
            }
        };

        match reply {
            Ok(mut reply) => {
                reply.request = correlation;
                Some(reply)
            }
            Err(e) => {
                tracing::error!(request = correlation, error = %e, "failed to build reply");
                None
            }
        }
    }
}
