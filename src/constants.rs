//! Application-wide constants and configuration defaults
//!
//! This module centralizes all magic numbers and configuration constants
//! so that tunables live in one place.

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Maximum number of idle connections per host in the HTTP client pool
pub const HTTP_POOL_MAX_IDLE_PER_HOST: usize = 16;

/// Default number of dates fetched concurrently
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Delay between per-event statistics requests (milliseconds)
pub const DEFAULT_STATISTICS_DELAY_MS: u64 = 1000;

/// Remote API endpoints
pub mod api {
    /// Base URL of the sports data API
    pub const BASE_URL: &str = "https://www.sofascore.com/api/v1";

    /// Page visited to bootstrap cookies and client identity
    pub const HOME_URL: &str = "https://www.sofascore.com/";

    /// Value sent as `origin` on API requests
    pub const ORIGIN: &str = "https://www.sofascore.com";

    /// Statistics period whose groups are merged into event rows
    pub const ALL_PERIOD: &str = "ALL";
}

/// Client identity and external tool defaults
pub mod client {
    /// User agent used when no rendering engine reports one
    pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

    /// Accept-Language sent with every request
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    /// Command used to run the rendering engine driver script
    pub const BROWSER_COMMAND: &str = "node";

    /// Command-line HTTP client used by the shelled transport
    pub const CURL_COMMAND: &str = "curl";

    /// Length of the rotating `x-requested-with` token
    pub const REQUEST_TOKEN_LENGTH: usize = 6;
}

/// Environment variable names
pub mod env_vars {
    /// Override for the API base URL
    pub const API_BASE_URL: &str = "DARTS_API_BASE_URL";

    /// Override for the log file path
    pub const LOG_FILE: &str = "DARTS_LOG_FILE";

    /// Override for the HTTP timeout in seconds
    pub const HTTP_TIMEOUT: &str = "DARTS_HTTP_TIMEOUT";

    /// Override for the transport chain (`direct-only`, `direct-then-rendered`, `shelled`)
    pub const TRANSPORT: &str = "DARTS_TRANSPORT";

    /// Override for worker concurrency
    pub const CONCURRENCY: &str = "DARTS_CONCURRENCY";

    /// Override for statistics fetching (`true`/`false`/`1`/`0`)
    pub const INCLUDE_STATS: &str = "DARTS_INCLUDE_STATS";

    /// Comma separated list of target dates (YYYY-MM-DD)
    pub const DATES: &str = "DARTS_DATES";
}

/// Retry configuration
pub mod retry {
    /// Maximum number of attempts per transport strategy
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 2000;

    /// Upper bound of random jitter added to each backoff (milliseconds)
    pub const JITTER_MS: u64 = 500;

    /// Politeness delay before the first attempt of every request (milliseconds)
    pub const POLITENESS_DELAY_MS: u64 = 1500;

    /// Upper bound of random jitter added to the politeness delay (milliseconds)
    pub const POLITENESS_JITTER_MS: u64 = 500;

    /// Wait applied to a 429 without a usable Retry-After header (seconds)
    pub const RATE_LIMIT_DELAY_SECONDS: u64 = 60;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECONDS: u64 = 60;

    /// Consecutive 429 waits tolerated before a 429 counts as a failed attempt
    pub const MAX_RATE_LIMIT_WAITS: u32 = 5;
}

/// Rendering engine driver output markers
pub mod browser {
    pub const RESULT_START: &str = "RESULT_START";
    pub const RESULT_END: &str = "RESULT_END";

    /// Navigation timeout handed to the driver (milliseconds)
    pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

    /// Environment variable carrying the render identity JSON to the driver
    pub const IDENTITY_ENV: &str = "DARTS_RENDER_IDENTITY";
}
