//! Interchangeable request mechanisms, tried in escalation order.

use futures::future::BoxFuture;
use http::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub mod direct;
pub mod rendered;
pub mod shelled;

pub use direct::DirectTransport;
pub use rendered::RenderedTransport;
pub use shelled::{CookieJar, ShelledTransport};

use crate::constants::client::{ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_VALUE, REQUEST_TOKEN_LENGTH};
use crate::data_fetcher::browser::BrowserEngine;
use crate::data_fetcher::session::{Cookie, SessionCredentials};
use crate::error::TransportError;

/// Header the API expects to carry a short token that changes per request.
pub const REQUEST_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-requested-with");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Direct,
    Rendered,
    Shelled,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Direct => "direct",
            TransportKind::Rendered => "rendered",
            TransportKind::Shelled => "shelled",
        };
        f.write_str(name)
    }
}

/// One mechanism able to GET a URL and hand back its JSON body.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether requests depend on session cookies and identity. A 403 from
    /// such a transport triggers a session refresh.
    fn requires_session(&self) -> bool;

    fn issue_request<'a>(
        &'a self,
        url: &'a str,
        headers: &'a HeaderMap,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, TransportError>>;
}

/// Per-task resources handed to every request of that task.
#[derive(Debug, Default)]
pub struct RequestContext {
    cookie_jar: Option<CookieJar>,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext::default()
    }

    /// Context owning a uniquely named cookie jar, deleted when the context drops.
    pub fn with_cookie_jar() -> std::io::Result<Self> {
        Ok(RequestContext {
            cookie_jar: Some(CookieJar::create()?),
        })
    }

    pub fn cookie_jar(&self) -> Option<&CookieJar> {
        self.cookie_jar.as_ref()
    }
}

/// Which strategies are tried, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportChain {
    DirectOnly,
    #[default]
    DirectThenRendered,
    Shelled,
}

impl TransportChain {
    pub fn kinds(&self) -> &'static [TransportKind] {
        match self {
            TransportChain::DirectOnly => &[TransportKind::Direct],
            TransportChain::DirectThenRendered => &[TransportKind::Direct, TransportKind::Rendered],
            TransportChain::Shelled => &[TransportKind::Shelled],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportChain::DirectOnly => "direct-only",
            TransportChain::DirectThenRendered => "direct-then-rendered",
            TransportChain::Shelled => "shelled",
        }
    }

    /// Whether tasks need a private cookie jar on disk.
    pub fn uses_cookie_jar(&self) -> bool {
        self.kinds().contains(&TransportKind::Shelled)
    }
}

impl fmt::Display for TransportChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportChain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct-only" => Ok(TransportChain::DirectOnly),
            "direct-then-rendered" => Ok(TransportChain::DirectThenRendered),
            "shelled" => Ok(TransportChain::Shelled),
            other => Err(format!(
                "unknown transport '{other}', expected direct-only, direct-then-rendered or shelled"
            )),
        }
    }
}

/// Referer/origin pair sent with API requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub referer: String,
    pub origin: String,
}

impl HeaderProfile {
    pub fn from_home_url(home_url: &str) -> Self {
        let origin = home_url.trim_end_matches('/').to_string();
        HeaderProfile {
            referer: format!("{origin}/"),
            origin,
        }
    }
}

/// Builds the header set for one request. The user agent always comes from
/// the session so it matches the identity the cookies were issued to.
pub fn build_request_headers(profile: &HeaderProfile, session: &SessionCredentials) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

    insert_checked(&mut headers, REFERER, &profile.referer);
    insert_checked(&mut headers, ORIGIN, &profile.origin);
    insert_checked(&mut headers, USER_AGENT, session.user_agent());
    if let Some(cookie) = session.cookie_header() {
        insert_checked(&mut headers, COOKIE, &cookie);
    }
    insert_checked(&mut headers, REQUEST_TOKEN_HEADER, &request_token());

    headers
}

fn insert_checked(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Dropping header {name} with a value that is not valid in HTTP"),
    }
}

/// Splits a `cookie` header value back into name/value pairs.
pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| Cookie {
                name: name.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Fresh lowercase hex token for the rotating request header.
pub fn request_token() -> String {
    let mut rng = rand::rng();
    (0..REQUEST_TOKEN_LENGTH)
        .map(|_| char::from_digit(rng.random_range(0..16u32), 16).unwrap_or('0'))
        .collect()
}

/// Parses a `Retry-After` value given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Instantiates the strategies of `chain` in escalation order.
pub fn build_chain(
    chain: TransportChain,
    client: &Client,
    engine: &BrowserEngine,
    curl_command: &str,
    timeout: Duration,
) -> Vec<Arc<dyn Transport>> {
    chain
        .kinds()
        .iter()
        .map(|kind| -> Arc<dyn Transport> {
            match kind {
                TransportKind::Direct => Arc::new(DirectTransport::new(client.clone())),
                TransportKind::Rendered => Arc::new(RenderedTransport::new(engine.clone())),
                TransportKind::Shelled => Arc::new(ShelledTransport::new(curl_command, timeout)),
            }
        })
        .collect()
}
