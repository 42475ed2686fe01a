//! Bounded retry with exponential backoff and strategy escalation.

use http::HeaderMap;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::RetryConfig;
use crate::data_fetcher::session::{SessionManager, SessionSnapshot};
use crate::data_fetcher::transport::{
    HeaderProfile, RequestContext, Transport, build_request_headers,
};
use crate::error::{FailureKind, FetchError, TransportError};

/// Delay arithmetic for one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
    pub politeness_delay: Duration,
    pub politeness_jitter: Duration,
    pub rate_limit_default: Duration,
    pub max_delay: Duration,
    pub max_rate_limit_waits: u32,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            politeness_delay: Duration::from_millis(config.politeness_delay_ms),
            politeness_jitter: Duration::from_millis(config.politeness_jitter_ms),
            rate_limit_default: Duration::from_secs(config.rate_limit_default_seconds),
            max_delay: Duration::from_secs(config.max_delay_seconds),
            max_rate_limit_waits: config.max_rate_limit_waits,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt` without jitter, saturating.
    pub fn backoff_base(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sleep after the `attempt`-th failed attempt on a strategy, capped at
    /// `max_delay`. Non-decreasing in `attempt` as long as jitter <= base.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        (self.backoff_base(attempt) + random_up_to(self.jitter)).min(self.max_delay)
    }

    /// Randomized pause before the first attempt of every request.
    pub fn politeness(&self) -> Duration {
        self.politeness_delay + random_up_to(self.politeness_jitter)
    }

    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.rate_limit_default)
    }
}

fn random_up_to(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Bookkeeping of one `execute` call.
#[derive(Debug, Default)]
struct RetryState {
    /// Failed attempts on the current strategy.
    attempt: u32,
    /// Requests issued plus failed session lookups, across all strategies.
    total_attempts: u32,
    strategy_index: usize,
    /// Consecutive 429 waits.
    rate_limit_waits: u32,
    backoff_elapsed: Duration,
    last_failure: Option<FailureKind>,
    last_reason: String,
}

enum NextStep {
    Retry(Duration),
    Escalate,
    GiveUp,
}

/// Runs requests over an ordered transport chain.
pub struct RetryController {
    policy: RetryPolicy,
    chain: Vec<Arc<dyn Transport>>,
    session: Arc<SessionManager>,
    profile: HeaderProfile,
}

impl RetryController {
    pub fn new(
        policy: RetryPolicy,
        chain: Vec<Arc<dyn Transport>>,
        session: Arc<SessionManager>,
        profile: HeaderProfile,
    ) -> Self {
        RetryController {
            policy,
            chain,
            session,
            profile,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Fetches `url` as JSON, retrying and escalating until it succeeds or
    /// every strategy's budget is spent.
    #[instrument(skip(self, ctx))]
    pub async fn execute(&self, url: &str, ctx: &RequestContext) -> Result<Value, FetchError> {
        if self.chain.is_empty() {
            return Err(FetchError {
                exhausted: false,
                attempts: 0,
                last_reason: "no transport configured".to_string(),
            });
        }

        tokio::time::sleep(self.policy.politeness()).await;
        let mut state = RetryState::default();

        loop {
            let transport = &self.chain[state.strategy_index];

            let session = if transport.requires_session() {
                match self.session.current().await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        state.total_attempts += 1;
                        state.rate_limit_waits = 0;
                        state.last_failure = None;
                        state.last_reason =
                            format!("{}: session unavailable: {e}", transport.kind());
                        warn!("{}", state.last_reason);
                        match self.after_failure(&mut state) {
                            Some(delay) => tokio::time::sleep(delay).await,
                            None => return Err(self.exhausted(&state)),
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            let headers = match &session {
                Some(snapshot) => build_request_headers(&self.profile, &snapshot.credentials),
                None => HeaderMap::new(),
            };

            state.total_attempts += 1;
            let err = match transport.issue_request(url, &headers, ctx).await {
                Ok(payload) => {
                    debug!(
                        "{} succeeded via {} after {} attempts ({:?} backing off)",
                        url,
                        transport.kind(),
                        state.total_attempts,
                        state.backoff_elapsed
                    );
                    return Ok(payload);
                }
                Err(err) => err,
            };

            let kind = err.classify();
            state.last_failure = Some(kind);
            state.last_reason = format!("{}: {err}", transport.kind());

            match kind {
                FailureKind::RateLimited
                    if state.rate_limit_waits < self.policy.max_rate_limit_waits =>
                {
                    let retry_after = match &err {
                        TransportError::Status { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let wait = self.policy.rate_limit_wait(retry_after);
                    state.rate_limit_waits += 1;
                    warn!(
                        "Rate limited on {} via {}, waiting {:?} ({}/{})",
                        url,
                        transport.kind(),
                        wait,
                        state.rate_limit_waits,
                        self.policy.max_rate_limit_waits
                    );
                    tokio::time::sleep(wait).await;
                    state.backoff_elapsed += wait;
                    continue;
                }
                FailureKind::Forbidden => {
                    state.rate_limit_waits = 0;
                    if let Some(snapshot) = &session {
                        self.refresh_session(snapshot).await;
                    }
                    if state.strategy_index + 1 < self.chain.len() {
                        self.escalate(&mut state, "forbidden");
                        continue;
                    }
                }
                FailureKind::RateLimited => {
                    warn!(
                        "Still rate limited on {} after {} waits, counting as a failure",
                        url, state.rate_limit_waits
                    );
                    state.rate_limit_waits = 0;
                }
                _ => state.rate_limit_waits = 0,
            }

            warn!(
                "Attempt on {} failed ({:?}): {}",
                url, state.last_failure, state.last_reason
            );
            match self.after_failure(&mut state) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(self.exhausted(&state)),
            }
        }
    }

    /// Counts a failed attempt and returns the pause before the next one, or
    /// `None` once the whole chain is spent.
    fn after_failure(&self, state: &mut RetryState) -> Option<Duration> {
        state.attempt += 1;
        let step = if state.attempt < self.policy.max_attempts {
            NextStep::Retry(self.policy.backoff_delay(state.attempt))
        } else if state.strategy_index + 1 < self.chain.len() {
            NextStep::Escalate
        } else {
            NextStep::GiveUp
        };

        match step {
            NextStep::Retry(delay) => {
                debug!(
                    "Backing off {:?} before attempt {}/{}",
                    delay,
                    state.attempt + 1,
                    self.policy.max_attempts
                );
                state.backoff_elapsed += delay;
                Some(delay)
            }
            NextStep::Escalate => {
                self.escalate(state, "budget spent");
                Some(Duration::ZERO)
            }
            NextStep::GiveUp => None,
        }
    }

    fn escalate(&self, state: &mut RetryState, context: &str) {
        let from = self.chain[state.strategy_index].kind();
        state.strategy_index += 1;
        state.attempt = 0;
        state.rate_limit_waits = 0;
        info!(
            "Escalating from {} to {} ({})",
            from,
            self.chain[state.strategy_index].kind(),
            context
        );
    }

    async fn refresh_session(&self, seen: &SessionSnapshot) {
        match self.session.refresh(seen.generation).await {
            Ok(fresh) => debug!("Using session generation {}", fresh.generation),
            Err(e) => warn!("Could not refresh session after 403: {e}"),
        }
    }

    fn exhausted(&self, state: &RetryState) -> FetchError {
        FetchError {
            exhausted: true,
            attempts: state.total_attempts,
            last_reason: state.last_reason.clone(),
        }
    }
}
