//! Multi-date fetching over a bounded pool of tasks.

use chrono::NaiveDate;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::data_fetcher::api::{
    build_event_statistics_url, build_scheduled_events_url, create_http_client_with_timeout,
};
use crate::data_fetcher::browser::BrowserEngine;
use crate::data_fetcher::models::{EventRow, FetchResult, FetchTask};
use crate::data_fetcher::processors::{merge_statistics, parse_event_rows, statistics_pairs};
use crate::data_fetcher::retry::{RetryController, RetryPolicy};
use crate::data_fetcher::session::{
    BrowserSessionEstablisher, HttpSessionEstablisher, SessionEstablisher, SessionManager,
};
use crate::data_fetcher::transport::{
    HeaderProfile, RequestContext, Transport, TransportChain, build_chain,
};
use crate::error::{AppError, StatisticsUnavailable};

/// Entry point for batch fetches. Cheap to clone; clones share the session
/// and the connection pool.
#[derive(Clone)]
pub struct DartsFetcher {
    inner: Arc<FetcherInner>,
}

struct FetcherInner {
    controller: RetryController,
    api_base_url: String,
    statistics_delay: Duration,
    needs_session: bool,
    uses_cookie_jar: bool,
}

impl DartsFetcher {
    pub fn new(
        controller: RetryController,
        chain: &[Arc<dyn Transport>],
        api_base_url: impl Into<String>,
        statistics_delay: Duration,
        uses_cookie_jar: bool,
    ) -> Self {
        DartsFetcher {
            inner: Arc::new(FetcherInner {
                controller,
                api_base_url: api_base_url.into(),
                statistics_delay,
                needs_session: chain.iter().any(|t| t.requires_session()),
                uses_cookie_jar,
            }),
        }
    }

    /// Wires the session, transport chain and retry policy described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.http_timeout_seconds);
        let client = create_http_client_with_timeout(config.http_timeout_seconds)?;
        let engine = BrowserEngine::new(&config.browser_command, timeout);

        let establisher: Arc<dyn SessionEstablisher> = match config.transport {
            TransportChain::DirectThenRendered => Arc::new(BrowserSessionEstablisher::new(
                engine.clone(),
                &config.home_url,
            )),
            TransportChain::DirectOnly | TransportChain::Shelled => Arc::new(
                HttpSessionEstablisher::new(client.clone(), &config.home_url, &config.user_agent),
            ),
        };

        let chain = build_chain(
            config.transport,
            &client,
            &engine,
            &config.curl_command,
            timeout,
        );
        let session = Arc::new(SessionManager::new(establisher));
        let controller = RetryController::new(
            RetryPolicy::from(&config.retry),
            chain.clone(),
            session,
            HeaderProfile::from_home_url(&config.home_url),
        );

        info!(
            "Fetcher ready: transport {}, {} attempts per strategy",
            config.transport, config.retry.max_attempts
        );

        Ok(DartsFetcher::new(
            controller,
            &chain,
            &config.api_base_url,
            Duration::from_millis(config.statistics_delay_ms),
            config.transport.uses_cookie_jar(),
        ))
    }

    /// Fetches every date in `dates` with at most `concurrency` dates in
    /// flight. Returns one result per distinct date, ordered by date.
    ///
    /// A date whose requests keep failing yields an empty row list and an
    /// error; it never affects the other dates. Only a session that cannot
    /// be established at all fails the whole call.
    #[instrument(skip(self, dates))]
    pub async fn fetch_range(
        &self,
        dates: impl IntoIterator<Item = NaiveDate>,
        include_stats: bool,
        concurrency: usize,
    ) -> Result<BTreeMap<NaiveDate, FetchResult>, AppError> {
        let dates: BTreeSet<NaiveDate> = dates.into_iter().collect();
        if dates.is_empty() {
            return Ok(BTreeMap::new());
        }

        if self.inner.needs_session {
            let snapshot = self.inner.controller.session().current().await?;
            debug!("Batch uses session generation {}", snapshot.generation);
        }

        let concurrency = concurrency.max(1);
        info!(
            "Fetching {} dates with concurrency {} (statistics: {})",
            dates.len(),
            concurrency,
            include_stats
        );

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for &date in &dates {
            let inner = Arc::clone(&self.inner);
            let permits = Arc::clone(&permits);
            let task = FetchTask {
                date,
                include_stats,
            };
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(inner.run_task(task))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| FetchResult::failure(date, "fetch task panicked")),
                    Err(_) => FetchResult::failure(date, "worker pool closed"),
                };
                (date, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((date, result)) => {
                    debug!("Task for {} finished (ok: {})", date, result.is_success());
                    results.insert(date, result);
                }
                Err(e) => error!("Fetch task did not complete: {e}"),
            }
        }

        for date in dates {
            results
                .entry(date)
                .or_insert_with(|| FetchResult::failure(date, "task did not complete"));
        }

        let failed = results.values().filter(|r| !r.is_success()).count();
        info!("Batch done: {} dates, {} failed", results.len(), failed);
        Ok(results)
    }
}

impl FetcherInner {
    async fn run_task(&self, task: FetchTask) -> FetchResult {
        let ctx = if self.uses_cookie_jar {
            match RequestContext::with_cookie_jar() {
                Ok(ctx) => ctx,
                Err(e) => {
                    return FetchResult::failure(task.date, format!("cookie jar: {e}"));
                }
            }
        } else {
            RequestContext::new()
        };

        match self.fetch_rows(task, &ctx).await {
            Ok(rows) => {
                info!("{}: {} events", task.date, rows.len());
                FetchResult::success(task.date, rows)
            }
            Err(reason) => {
                warn!("{}: {}", task.date, reason);
                FetchResult::failure(task.date, reason)
            }
        }
        // ctx and its cookie jar drop here
    }

    async fn fetch_rows(
        &self,
        task: FetchTask,
        ctx: &RequestContext,
    ) -> Result<Vec<EventRow>, String> {
        let url = build_scheduled_events_url(&self.api_base_url, task.date);
        let payload = self
            .controller
            .execute(&url, ctx)
            .await
            .map_err(|e| e.to_string())?;
        let mut rows = parse_event_rows(&payload, task.date).map_err(|e| e.to_string())?;

        if task.include_stats {
            self.attach_statistics(&mut rows, ctx).await;
        }
        Ok(rows)
    }

    /// Fetches statistics one event at a time, pausing between requests.
    async fn attach_statistics(&self, rows: &mut [EventRow], ctx: &RequestContext) {
        for (index, row) in rows.iter_mut().enumerate() {
            if index > 0 && !self.statistics_delay.is_zero() {
                tokio::time::sleep(self.statistics_delay).await;
            }
            match self.fetch_statistics(row.id, ctx).await {
                Ok(pairs) => merge_statistics(row, pairs),
                Err(unavailable) => warn!("{unavailable}"),
            }
        }
    }

    async fn fetch_statistics(
        &self,
        event_id: i64,
        ctx: &RequestContext,
    ) -> Result<BTreeMap<String, serde_json::Value>, StatisticsUnavailable> {
        let url = build_event_statistics_url(&self.api_base_url, event_id);
        let payload = self
            .controller
            .execute(&url, ctx)
            .await
            .map_err(|e| StatisticsUnavailable {
                event_id,
                reason: e.to_string(),
            })?;
        statistics_pairs(event_id, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_fetcher::transport::TransportKind;
    use crate::testing_utils::{ScriptedTransport, StaticSessionEstablisher, TestPayloads};
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::PathBuf;

    const BASE: &str = "https://api.test/api/v1";

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
            politeness_delay: Duration::ZERO,
            politeness_jitter: Duration::ZERO,
            rate_limit_default: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            max_rate_limit_waits: 1,
        }
    }

    fn fetcher(transport: Arc<ScriptedTransport>, statistics_delay: Duration) -> DartsFetcher {
        build(transport, statistics_delay, false)
    }

    fn build(
        transport: Arc<ScriptedTransport>,
        statistics_delay: Duration,
        uses_cookie_jar: bool,
    ) -> DartsFetcher {
        let chain: Vec<Arc<dyn Transport>> = vec![transport];
        let establisher = Arc::new(StaticSessionEstablisher::new("UA"));
        let session = Arc::new(SessionManager::new(establisher));
        let controller = RetryController::new(
            policy(),
            chain.clone(),
            session,
            HeaderProfile::from_home_url("https://www.sofascore.com/"),
        );
        DartsFetcher::new(controller, &chain, BASE, statistics_delay, uses_cookie_jar)
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_dates_fetch_once() {
        let url = build_scheduled_events_url(BASE, d(1));
        let transport = Arc::new(
            ScriptedTransport::new(TransportKind::Direct)
                .always(url.clone(), TestPayloads::scheduled_events(&[1])),
        );
        let fetcher = fetcher(transport.clone(), Duration::ZERO);

        let results = fetcher.fetch_range([d(1), d(1)], false, 2).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(transport.calls_for(&url), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_fetched_sequentially_with_delay() {
        let schedule = build_scheduled_events_url(BASE, d(1));
        let stats_a = build_event_statistics_url(BASE, 10);
        let stats_b = build_event_statistics_url(BASE, 11);
        let transport = Arc::new(
            ScriptedTransport::new(TransportKind::Direct)
                .always(schedule, TestPayloads::scheduled_events(&[10, 11]))
                .always(
                    stats_a.clone(),
                    TestPayloads::statistics(&[("Thrown180", json!(3), json!(1))]),
                )
                .always(
                    stats_b.clone(),
                    TestPayloads::statistics(&[("Thrown180", json!(0), json!(2))]),
                ),
        );
        let fetcher = fetcher(transport.clone(), Duration::from_millis(1000));

        let results = fetcher.fetch_range([d(1)], true, 1).await.unwrap();
        let rows = &results[&d(1)].rows;
        assert_eq!(rows[0].statistics["Thrown180_home"], json!(3));
        assert_eq!(rows[1].statistics["Thrown180_away"], json!(2));

        let calls = transport.recorded();
        let a = calls.iter().find(|c| c.url == stats_a).unwrap().at;
        let b = calls.iter().find(|c| c.url == stats_b).unwrap().at;
        assert_eq!(b - a, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_statistics_keep_row() {
        let schedule = build_scheduled_events_url(BASE, d(1));
        let transport = Arc::new(
            ScriptedTransport::new(TransportKind::Direct)
                .always(schedule, TestPayloads::scheduled_events(&[10])),
        );
        let fetcher = fetcher(transport, Duration::ZERO);

        let results = fetcher.fetch_range([d(1)], true, 1).await.unwrap();
        let result = &results[&d(1)];
        assert!(result.is_success());
        assert_eq!(result.rows.len(), 1);
        assert!(!result.rows[0].has_statistics());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let mut transport = ScriptedTransport::new(TransportKind::Direct);
        for day in 1..=4 {
            let url = build_scheduled_events_url(BASE, d(day));
            transport = transport
                .always(url.clone(), TestPayloads::scheduled_events(&[]))
                .with_delay(url, Duration::from_secs(10));
        }
        let transport = Arc::new(transport);
        let fetcher = fetcher(transport.clone(), Duration::ZERO);

        let start = tokio::time::Instant::now();
        let results = fetcher.fetch_range((1..=4).map(d), false, 2).await.unwrap();
        assert_eq!(results.len(), 4);

        let mut starts: Vec<Duration> =
            transport.recorded().iter().map(|c| c.at - start).collect();
        starts.sort();
        assert_eq!(
            starts,
            vec![
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_secs(10),
                Duration::from_secs(10)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_task_gets_its_own_cookie_jar_removed_afterwards() {
        let ok_url = build_scheduled_events_url(BASE, d(1));
        let failing_url = build_scheduled_events_url(BASE, d(2));
        let transport = Arc::new(
            ScriptedTransport::new(TransportKind::Shelled)
                .always(ok_url.clone(), TestPayloads::scheduled_events(&[1]))
                .with_delay(ok_url.clone(), Duration::from_secs(1))
                .on(failing_url.clone(), vec![Err(TestPayloads::network())])
                .with_delay(failing_url.clone(), Duration::from_secs(1)),
        );
        let fetcher = build(transport.clone(), Duration::ZERO, true);

        let results = fetcher.fetch_range([d(1), d(2)], false, 2).await.unwrap();
        assert!(results[&d(1)].is_success());
        assert!(!results[&d(2)].is_success());

        let jars_for = |url: &str| -> HashSet<PathBuf> {
            transport
                .recorded()
                .iter()
                .filter(|c| c.url == url)
                .map(|c| {
                    let (path, existed) = c.cookie_jar.clone().expect("task without a jar");
                    assert!(existed, "jar missing while the request ran");
                    path
                })
                .collect()
        };
        let ok_jars = jars_for(&ok_url);
        let failing_jars = jars_for(&failing_url);

        // retries of one date share a jar, different dates never do
        assert_eq!(ok_jars.len(), 1);
        assert_eq!(failing_jars.len(), 1);
        assert!(ok_jars.is_disjoint(&failing_jars));
        assert_eq!(transport.calls_for(&failing_url), 2);

        for path in ok_jars.iter().chain(&failing_jars) {
            assert!(!path.exists(), "{} left behind", path.display());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cookie_jar_without_shelled_transport() {
        let url = build_scheduled_events_url(BASE, d(1));
        let transport = Arc::new(
            ScriptedTransport::new(TransportKind::Direct)
                .always(url, TestPayloads::scheduled_events(&[1])),
        );
        let fetcher = fetcher(transport.clone(), Duration::ZERO);

        fetcher.fetch_range([d(1)], false, 1).await.unwrap();
        assert!(transport.recorded()[0].cookie_jar.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_returns_empty_map() {
        let transport = Arc::new(ScriptedTransport::new(TransportKind::Direct));
        let fetcher = fetcher(transport.clone(), Duration::ZERO);
        let results = fetcher.fetch_range([], true, 3).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(transport.calls(), 0);
    }
}
