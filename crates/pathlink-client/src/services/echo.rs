use async_trait::async_trait;

use pathlink_core::error::Result;
use pathlink_core::protocol::envelope::{InnerRequest, InnerResponse, CONTENT_TYPE};

use crate::dispatch::PathHandler;

/// Reply with the request body unchanged. Useful to prove request routing.
pub struct EchoHandler {
    path: String,
}

impl EchoHandler {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PathHandler for EchoHandler {
    fn path(&self) -> &str {
        &self.path
    }

    async fn handle(&self, req: InnerRequest) -> Result<InnerResponse> {
        let body = req.body_bytes()?;
        let content_type = req
            .header(CONTENT_TYPE)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(InnerResponse::new(req.request_id, 200, &body).with_header(CONTENT_TYPE, content_type))
    }
}
