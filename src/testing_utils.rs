//! In-memory collaborators and payload builders shared by unit and integration tests.

use futures::future::BoxFuture;
use http::HeaderMap;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::data_fetcher::session::{Cookie, SessionCredentials, SessionEstablisher};
use crate::data_fetcher::transport::{RequestContext, Transport, TransportKind};
use crate::error::{SessionError, TransportError};

type Scripted = Result<Value, TransportError>;

#[derive(Default)]
struct Route {
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
    delay: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: HeaderMap,
    pub at: Instant,
    /// Jar file of the calling task and whether it existed during the call.
    pub cookie_jar: Option<(PathBuf, bool)>,
}

/// Transport answering from per-URL scripts.
///
/// Each URL replays its queued outcomes in order and then keeps repeating the
/// last one. Unscripted URLs fail with a network error.
pub struct ScriptedTransport {
    kind: TransportKind,
    requires_session: bool,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind) -> Self {
        ScriptedTransport {
            kind,
            requires_session: true,
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn requiring_session(mut self, requires_session: bool) -> Self {
        self.requires_session = requires_session;
        self
    }

    /// Appends outcomes for `url`.
    pub fn on(self, url: impl Into<String>, outcomes: Vec<Scripted>) -> Self {
        {
            let mut routes = lock(&self.routes);
            routes.entry(url.into()).or_default().queue.extend(outcomes);
        }
        self
    }

    /// Shorthand for a URL that always succeeds with `payload`.
    pub fn always(self, url: impl Into<String>, payload: Value) -> Self {
        self.on(url, vec![Ok(payload)])
    }

    /// Delays every answer for `url`.
    pub fn with_delay(self, url: impl Into<String>, delay: Duration) -> Self {
        {
            let mut routes = lock(&self.routes);
            routes.entry(url.into()).or_default().delay = delay;
        }
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.url == url)
            .count()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    fn next_outcome(&self, url: &str) -> (Scripted, Duration) {
        let mut routes = lock(&self.routes);
        let Some(route) = routes.get_mut(url) else {
            return (
                Err(TransportError::Network(format!("no scripted response for {url}"))),
                Duration::ZERO,
            );
        };

        let outcome = match route.queue.pop_front() {
            Some(outcome) => {
                route.last = Some(outcome.clone());
                outcome
            }
            None => route
                .last
                .clone()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into()))),
        };
        (outcome, route.delay)
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn requires_session(&self) -> bool {
        self.requires_session
    }

    fn issue_request<'a>(
        &'a self,
        url: &'a str,
        headers: &'a HeaderMap,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(async move {
            let cookie_jar = ctx.cookie_jar().map(|jar| {
                let path = jar.path().to_path_buf();
                let exists = path.exists();
                (path, exists)
            });
            lock(&self.calls).push(RecordedCall {
                url: url.to_string(),
                headers: headers.clone(),
                at: Instant::now(),
                cookie_jar,
            });
            let (outcome, delay) = self.next_outcome(url);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}

/// Establisher handing out numbered sessions without touching the network.
pub struct StaticSessionEstablisher {
    user_agent: String,
    delay: Duration,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl StaticSessionEstablisher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        StaticSessionEstablisher {
            user_agent: user_agent.into(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next `n` establish calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionEstablisher for StaticSessionEstablisher {
    fn establish(&self) -> BoxFuture<'_, Result<SessionCredentials, SessionError>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SessionError::Http("scripted bootstrap failure".into()));
            }

            Ok(SessionCredentials::new(
                self.user_agent.clone(),
                vec![Cookie {
                    name: "session".into(),
                    value: format!("s{call}"),
                }],
            ))
        })
    }
}

/// Builders for API payloads.
pub struct TestPayloads;

impl TestPayloads {
    /// A scheduled-events payload with one ended match per id.
    pub fn scheduled_events(ids: &[i64]) -> Value {
        let events: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "slug": format!("player-{id}-a-player-{id}-b"),
                    "startTimestamp": 1717257600 + id,
                    "homeTeam": {"name": format!("Player {id}A")},
                    "awayTeam": {"name": format!("Player {id}B")},
                    "tournament": {"name": "Test Open"},
                    "status": {"description": "Ended", "type": "finished"},
                    "homeScore": {"display": 6},
                    "awayScore": {"display": 3},
                    "bestOfLegs": 11,
                    "winnerCode": 1
                })
            })
            .collect();
        json!({ "events": events })
    }

    /// A statistics payload with a single `ALL` period holding `items`.
    pub fn statistics(items: &[(&str, Value, Value)]) -> Value {
        let items: Vec<Value> = items
            .iter()
            .map(|(key, home, away)| json!({"key": key, "name": key, "home": home, "away": away}))
            .collect();
        json!({
            "statistics": [
                {"period": "ALL", "groups": [{"groupName": "Match", "statisticsItems": items}]}
            ]
        })
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> TransportError {
        TransportError::Status {
            status: 429,
            retry_after: retry_after_secs.map(Duration::from_secs),
        }
    }

    pub fn forbidden() -> TransportError {
        TransportError::status(403)
    }

    pub fn network() -> TransportError {
        TransportError::Network("connection reset".into())
    }
}
