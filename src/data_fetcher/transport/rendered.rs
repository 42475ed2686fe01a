use futures::future::BoxFuture;
use http::HeaderMap;
use http::header::{COOKIE, HeaderName, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use super::{RequestContext, Transport, TransportKind, parse_cookie_header};
use crate::data_fetcher::browser::{BrowserEngine, RenderIdentity};
use crate::error::TransportError;

/// Navigates the rendering engine to the API URL and reads the JSON out of
/// the displayed document. The engine runs under the session identity taken
/// from the request headers: user agent, cookies, and the referer as the
/// page visited first.
pub struct RenderedTransport {
    engine: BrowserEngine,
}

impl RenderedTransport {
    pub fn new(engine: BrowserEngine) -> Self {
        RenderedTransport { engine }
    }

    async fn render_json(&self, url: &str, headers: &HeaderMap) -> Result<Value, TransportError> {
        let page = self
            .engine
            .render(url, &render_identity(headers))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !(200..300).contains(&page.status) {
            debug!("Rendered navigation to {} answered {}", url, page.status);
            return Err(TransportError::status(page.status));
        }

        let body = page.body_text();
        serde_json::from_str(&body).map_err(|e| TransportError::Parse(e.to_string()))
    }
}

fn render_identity(headers: &HeaderMap) -> RenderIdentity {
    let text = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    RenderIdentity {
        user_agent: text(USER_AGENT).map(str::to_string),
        cookies: text(COOKIE).map(parse_cookie_header).unwrap_or_default(),
        home_url: text(REFERER).map(str::to_string),
    }
}

impl Transport for RenderedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rendered
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
        Box::pin(self.render_json(url, headers))
    }
}
