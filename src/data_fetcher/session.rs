//! Session bootstrap: cookies plus a client identity the remote service accepts.

use futures::future::BoxFuture;
use reqwest::Client;
use reqwest::header::{SET_COOKIE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::data_fetcher::browser::BrowserEngine;
use crate::error::SessionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Cookies and the user agent they were issued to.
///
/// Immutable once built; a rejected session is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    user_agent: String,
    cookies: Vec<Cookie>,
}

impl SessionCredentials {
    pub fn new(user_agent: impl Into<String>, cookies: Vec<Cookie>) -> Self {
        SessionCredentials {
            user_agent: user_agent.into(),
            cookies,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// `name=value; name=value`, or `None` without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Something that can obtain fresh [`SessionCredentials`].
pub trait SessionEstablisher: Send + Sync {
    fn establish(&self) -> BoxFuture<'_, Result<SessionCredentials, SessionError>>;
}

/// Bootstraps through the rendering engine; the user agent is whatever the
/// engine reports, never a configured value.
pub struct BrowserSessionEstablisher {
    engine: BrowserEngine,
    home_url: String,
}

impl BrowserSessionEstablisher {
    pub fn new(engine: BrowserEngine, home_url: impl Into<String>) -> Self {
        BrowserSessionEstablisher {
            engine,
            home_url: home_url.into(),
        }
    }
}

impl SessionEstablisher for BrowserSessionEstablisher {
    fn establish(&self) -> BoxFuture<'_, Result<SessionCredentials, SessionError>> {
        Box::pin(async move {
            let snapshot = self.engine.bootstrap(&self.home_url).await?;
            if snapshot.cookies.is_empty() {
                return Err(SessionError::NoCredentials {
                    url: self.home_url.clone(),
                });
            }
            Ok(SessionCredentials::new(snapshot.user_agent, snapshot.cookies))
        })
    }
}

/// Bootstraps with a plain GET of the home page, keeping the `Set-Cookie` pairs.
pub struct HttpSessionEstablisher {
    client: Client,
    home_url: String,
    user_agent: String,
}

impl HttpSessionEstablisher {
    pub fn new(client: Client, home_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        HttpSessionEstablisher {
            client,
            home_url: home_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

impl SessionEstablisher for HttpSessionEstablisher {
    fn establish(&self) -> BoxFuture<'_, Result<SessionCredentials, SessionError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.home_url)
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(|e| SessionError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SessionError::Http(format!(
                    "{} returned {}",
                    self.home_url, status
                )));
            }

            let cookies: Vec<Cookie> = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .filter_map(parse_set_cookie)
                .collect();

            if cookies.is_empty() {
                return Err(SessionError::NoCredentials {
                    url: self.home_url.clone(),
                });
            }

            Ok(SessionCredentials::new(self.user_agent.clone(), cookies))
        })
    }
}

/// Extracts the leading `name=value` pair of a `Set-Cookie` header.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

/// Credentials together with the generation that produced them.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub credentials: Arc<SessionCredentials>,
}

/// Process-wide session cache shared by every fetch task.
///
/// The first caller establishes the session; everyone else reuses it. A
/// refresh only re-establishes when the caller saw the current generation, so
/// a burst of rejections from concurrent tasks triggers one bootstrap.
pub struct SessionManager {
    establisher: Arc<dyn SessionEstablisher>,
    state: Mutex<Option<SessionSnapshot>>,
}

impl SessionManager {
    pub fn new(establisher: Arc<dyn SessionEstablisher>) -> Self {
        SessionManager {
            establisher,
            state: Mutex::new(None),
        }
    }

    /// Returns the cached session, establishing it on first use.
    pub async fn current(&self) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(snapshot) = state.as_ref() {
            return Ok(snapshot.clone());
        }

        let snapshot = self.establish_generation(1).await?;
        *state = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Replaces the session seen at `observed_generation`. If another task
    /// already replaced it, the newer session is returned untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self, observed_generation: u64) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(snapshot) = state.as_ref()
            && snapshot.generation != observed_generation
        {
            return Ok(snapshot.clone());
        }

        let next = state.as_ref().map_or(1, |s| s.generation + 1);
        match self.establish_generation(next).await {
            Ok(snapshot) => {
                *state = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Session refresh failed, keeping previous credentials: {e}");
                Err(e)
            }
        }
    }

    async fn establish_generation(&self, generation: u64) -> Result<SessionSnapshot, SessionError> {
        let credentials = self.establisher.establish().await?;
        info!(
            "Session generation {} established with {} cookies",
            generation,
            credentials.cookies().len()
        );
        Ok(SessionSnapshot {
            generation,
            credentials: Arc::new(credentials),
        })
    }
}
