use async_trait::async_trait;
use serde_json::Value;

use pathlink_core::error::Result;
use pathlink_core::protocol::envelope::{InnerRequest, InnerResponse};

use crate::dispatch::PathHandler;

/// Serve a fixed JSON document for one path.
pub struct StaticJsonHandler {
    path: String,
    doc: Value,
}

impl StaticJsonHandler {
    pub fn new(path: impl Into<String>, doc: Value) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }
}

#[async_trait]
impl PathHandler for StaticJsonHandler {
    fn path(&self) -> &str {
        &self.path
    }

    async fn handle(&self, req: InnerRequest) -> Result<InnerResponse> {
        tracing::trace!(path = %self.path, method = %req.method, "static response");
        InnerResponse::json(req.request_id, &self.doc)
    }
}
