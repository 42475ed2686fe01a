//! Headless rendering engine driver.
//!
//! The engine is a Playwright/Chromium script run by an external JavaScript
//! runtime (`node` by default, `require('playwright')` must resolve, e.g. via
//! `NODE_PATH`). Each call launches a fresh browser, prints its result as JSON
//! between two marker lines, and exits. A render reuses the session identity:
//! the context gets the session user agent and cookies and visits the home
//! page before the API URL. The child is killed if the call is
//! dropped or times out, and the generated script file is removed when the
//! call returns.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::constants::browser::{IDENTITY_ENV, NAVIGATION_TIMEOUT_MS, RESULT_END, RESULT_START};
use crate::data_fetcher::session::Cookie;
use crate::error::BrowserError;

const DRIVER_SCRIPT: &str = r#"
const { chromium } = require('playwright');

(async () => {
    const [mode, url, timeoutArg] = process.argv.slice(2);
    const timeout = Number(timeoutArg) || 30000;
    const identity = JSON.parse(process.env.DARTS_RENDER_IDENTITY || '{}');
    const browser = await chromium.launch({
        headless: true,
        args: [
            '--disable-blink-features=AutomationControlled',
            '--disable-dev-shm-usage',
            '--no-sandbox',
        ],
    });
    try {
        const options = { viewport: { width: 1920, height: 1080 }, locale: 'en-US' };
        if (identity.userAgent) {
            options.userAgent = identity.userAgent;
        }
        const context = await browser.newContext(options);
        const cookies = identity.cookies || [];
        if (cookies.length > 0) {
            const scopes = [url, identity.homeUrl].filter(Boolean);
            await context.addCookies(scopes.flatMap(scope =>
                cookies.map(c => ({ name: c.name, value: c.value, url: scope }))));
        }
        await context.addInitScript(() => {
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
        });
        const page = await context.newPage();
        if (mode === 'render' && identity.homeUrl) {
            await page.goto(identity.homeUrl, { waitUntil: 'domcontentloaded', timeout });
        }
        const response = await page.goto(url, { waitUntil: 'networkidle', timeout });

        let result;
        if (mode === 'bootstrap') {
            await page.waitForTimeout(1000 + Math.random() * 1000);
            const userAgent = await page.evaluate(() => navigator.userAgent);
            const cookies = (await context.cookies()).map(c => ({ name: c.name, value: c.value }));
            result = { userAgent, cookies };
        } else {
            result = { status: response ? response.status() : 0, content: await page.content() };
        }

        console.log('RESULT_START');
        console.log(JSON.stringify(result));
        console.log('RESULT_END');
    } finally {
        await browser.close();
    }
})().catch(err => {
    console.error(err && err.stack ? err.stack : String(err));
    process.exit(1);
});
"#;

/// Session material read back from a rendered home page visit.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BrowserSession {
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

/// Identity a render navigates with. Empty fields leave the engine defaults.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RenderIdentity {
    #[serde(rename = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub cookies: Vec<Cookie>,
    #[serde(rename = "homeUrl", skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
}

/// Final document of a rendered navigation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderedPage {
    pub status: u16,
    pub content: String,
}

impl RenderedPage {
    /// Raw response body as displayed by the engine.
    pub fn body_text(&self) -> String {
        extract_body_text(&self.content)
    }
}

#[derive(Debug, Clone)]
pub struct BrowserEngine {
    command: String,
    navigation_timeout: Duration,
    process_timeout: Duration,
}

impl BrowserEngine {
    /// `timeout` bounds the whole process; navigation gets the configured
    /// navigation timeout or `timeout`, whichever is shorter.
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        let navigation_timeout = timeout.min(Duration::from_millis(NAVIGATION_TIMEOUT_MS));
        BrowserEngine {
            command: command.into(),
            navigation_timeout,
            // launch and teardown on top of navigation
            process_timeout: timeout + Duration::from_secs(15),
        }
    }

    /// Visits `home_url` and returns the engine's own user agent plus the cookies it received.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self, home_url: &str) -> Result<BrowserSession, BrowserError> {
        let output = self.run("bootstrap", home_url, "{}").await?;
        let session: BrowserSession = serde_json::from_str(&output)
            .map_err(|e| BrowserError::Output(format!("bootstrap result: {e}")))?;
        if session.user_agent.trim().is_empty() {
            return Err(BrowserError::Output("engine reported an empty user agent".into()));
        }
        debug!(
            "Browser bootstrap produced {} cookies for {}",
            session.cookies.len(),
            home_url
        );
        Ok(session)
    }

    /// Navigates to `url` under `identity` and returns the status and final document.
    #[instrument(skip(self, identity))]
    pub async fn render(
        &self,
        url: &str,
        identity: &RenderIdentity,
    ) -> Result<RenderedPage, BrowserError> {
        let identity = serde_json::to_string(identity)
            .map_err(|e| BrowserError::Output(format!("render identity: {e}")))?;
        let output = self.run("render", url, &identity).await?;
        serde_json::from_str(&output)
            .map_err(|e| BrowserError::Output(format!("render result: {e}")))
    }

    async fn run(&self, mode: &str, url: &str, identity: &str) -> Result<String, BrowserError> {
        let launch_error = |message: String| BrowserError::Launch {
            command: self.command.clone(),
            message,
        };

        let mut script = tempfile::Builder::new()
            .prefix("darts-driver-")
            .suffix(".js")
            .tempfile()
            .map_err(|e| launch_error(format!("driver script: {e}")))?;
        script
            .write_all(DRIVER_SCRIPT.as_bytes())
            .and_then(|_| script.flush())
            .map_err(|e| launch_error(format!("driver script: {e}")))?;

        let child = Command::new(&self.command)
            .arg(script.path())
            .arg(mode)
            .arg(url)
            .arg(self.navigation_timeout.as_millis().to_string())
            .env(IDENTITY_ENV, identity)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(e.to_string()))?;

        let waited = tokio::time::timeout(self.process_timeout, child.wait_with_output()).await;
        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(launch_error(e.to_string())),
            Err(_) => {
                warn!("Rendering engine exceeded {:?} for {}", self.process_timeout, url);
                return Err(BrowserError::Timeout(self.process_timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BrowserError::Exited {
                status: output.status.to_string(),
                stderr: tail(stderr.trim(), 500).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        extract_marked_output(&stdout).map(str::to_string)
    }
}

/// Returns the text between the result markers of the driver output.
pub fn extract_marked_output(stdout: &str) -> Result<&str, BrowserError> {
    let start = stdout
        .find(RESULT_START)
        .ok_or_else(|| BrowserError::Output("missing result start marker".into()))?;
    let rest = &stdout[start + RESULT_START.len()..];
    let end = rest
        .find(RESULT_END)
        .ok_or_else(|| BrowserError::Output("missing result end marker".into()))?;
    Ok(rest[..end].trim())
}

/// Text of the first `<pre>` element when present (how engines display raw
/// JSON), otherwise the whole `<body>` text.
pub fn extract_body_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for css in ["pre", "body"] {
        if let Ok(selector) = Selector::parse(css)
            && let Some(element) = document.select(&selector).next()
        {
            return element.text().collect::<String>().trim().to_string();
        }
    }

    html.trim().to_string()
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let byte_index = text.char_indices().nth(skip).map_or(0, |(i, _)| i);
    &text[byte_index..]
}
