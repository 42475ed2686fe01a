use futures::future::BoxFuture;
use http::HeaderMap;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{RequestContext, Transport, TransportKind, parse_retry_after};
use crate::error::TransportError;

/// Plain HTTPS request through the shared connection pool.
pub struct DirectTransport {
    client: Client,
}

impl DirectTransport {
    pub fn new(client: Client) -> Self {
        DirectTransport { client }
    }

    #[instrument(skip(self, headers))]
    async fn get_json(&self, url: &str, headers: &HeaderMap) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(parse_retry_after);
            debug!("{} answered {}", url, status);
            return Err(TransportError::Status {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| TransportError::Parse(e.to_string()))
    }
}

impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn issue_request<'a>(
        &'a self,
        url: &'a str,
        headers: &'a HeaderMap,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(self.get_json(url, headers))
    }
}
