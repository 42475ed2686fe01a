use futures::future::BoxFuture;
use http::HeaderMap;
use http::header::{COOKIE, USER_AGENT};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{RequestContext, Transport, TransportKind, parse_cookie_header};
use crate::data_fetcher::session::Cookie;
use crate::error::TransportError;

const JAR_HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Cookie jar file private to one fetch task. Removed on drop.
#[derive(Debug)]
pub struct CookieJar {
    path: TempPath,
}

impl CookieJar {
    pub fn create() -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("darts-jar-")
            .suffix(".txt")
            .tempfile()?
            .into_temp_path();
        Ok(CookieJar { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the session cookies for `url` into the jar, keeping cookies curl
    /// stored there earlier unless the session carries the same name.
    pub async fn seed(&self, url: &str, cookies: &[Cookie]) -> std::io::Result<()> {
        let Some((host, secure)) = Url::parse(url)
            .ok()
            .and_then(|u| Some((u.host_str()?.to_string(), u.scheme() == "https")))
        else {
            return Ok(());
        };
        let existing = tokio::fs::read_to_string(self.path()).await.unwrap_or_default();
        tokio::fs::write(self.path(), merge_jar(&existing, &host, secure, cookies)).await
    }
}

/// Netscape cookie file with `cookies` for `host` replacing same-named entries
/// of `existing`.
pub fn merge_jar(existing: &str, host: &str, secure: bool, cookies: &[Cookie]) -> String {
    let names: HashSet<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
    let mut jar = format!("{JAR_HEADER}\n");

    for line in existing.lines() {
        let is_entry = !line.trim().is_empty()
            && (!line.starts_with('#') || line.starts_with(HTTP_ONLY_PREFIX));
        if is_entry && line.split('\t').nth(5).is_some_and(|name| !names.contains(name)) {
            jar.push_str(line);
            jar.push('\n');
        }
    }

    let secure = if secure { "TRUE" } else { "FALSE" };
    for cookie in cookies {
        jar.push_str(&format!(
            "{host}\tFALSE\t/\t{secure}\t0\t{}\t{}\n",
            cookie.name, cookie.value
        ));
    }
    jar
}

/// Runs an external command-line HTTP client per request.
pub struct ShelledTransport {
    command: String,
    timeout: Duration,
}

impl ShelledTransport {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        ShelledTransport {
            command: command.into(),
            timeout,
        }
    }

    #[instrument(skip(self, headers, ctx))]
    async fn curl_json(
        &self,
        url: &str,
        headers: &HeaderMap,
        ctx: &RequestContext,
    ) -> Result<Value, TransportError> {
        let jar = ctx.cookie_jar();
        if let Some(jar) = jar {
            let cookies = headers
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(parse_cookie_header)
                .unwrap_or_default();
            jar.seed(url, &cookies)
                .await
                .map_err(|e| TransportError::Network(format!("cookie jar: {e}")))?;
        }
        let args = curl_args(url, headers, jar.map(CookieJar::path), self.timeout);

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Network(format!("could not run {}: {e}", self.command)))?;

        // curl enforces --max-time itself, this only guards a hung process
        let grace = self.timeout + Duration::from_secs(5);
        let output = match tokio::time::timeout(grace, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(TransportError::Network(e.to_string())),
            Err(_) => {
                warn!("{} exceeded {:?} for {}", self.command, grace, url);
                return Err(TransportError::Network(format!("timed out after {grace:?}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Network(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (body, status) = split_status_trailer(&stdout)?;
        debug!("{} answered {} via {}", url, status, self.command);

        if !(200..300).contains(&status) {
            return Err(TransportError::status(status));
        }
        serde_json::from_str(body).map_err(|e| TransportError::Parse(e.to_string()))
    }
}

impl Transport for ShelledTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Shelled
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn issue_request<'a>(
        &'a self,
        url: &'a str,
        headers: &'a HeaderMap,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        Box::pin(self.curl_json(url, headers, ctx))
    }
}

/// Arguments for one curl invocation. The status code is appended to stdout
/// on its own line. With a jar, cookies travel only through the jar.
pub fn curl_args(
    url: &str,
    headers: &HeaderMap,
    cookie_jar: Option<&Path>,
    timeout: Duration,
) -> Vec<String> {
    let mut args = vec![
        "-sS".to_string(),
        "--compressed".to_string(),
        "--max-time".to_string(),
        timeout.as_secs().max(1).to_string(),
    ];

    if let Some(ua) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        args.push("-A".to_string());
        args.push(ua.to_string());
    }

    for (name, value) in headers {
        if name == USER_AGENT || (name == COOKIE && cookie_jar.is_some()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            args.push("-H".to_string());
            args.push(format!("{name}: {value}"));
        }
    }

    if let Some(jar) = cookie_jar {
        let jar = jar.to_string_lossy().into_owned();
        args.push("-b".to_string());
        args.push(jar.clone());
        args.push("-c".to_string());
        args.push(jar);
    }

    args.push("-w".to_string());
    args.push("\n%{http_code}".to_string());
    args.push(url.to_string());
    args
}

/// Splits curl output into body and the trailing status code line.
pub fn split_status_trailer(stdout: &str) -> Result<(&str, u16), TransportError> {
    let (body, code) = stdout
        .rsplit_once('\n')
        .ok_or_else(|| TransportError::Network("missing status trailer".to_string()))?;
    let status: u16 = code
        .trim()
        .parse()
        .map_err(|_| TransportError::Network(format!("bad status trailer '{}'", code.trim())))?;
    if status == 0 {
        return Err(TransportError::Network("no response received".to_string()));
    }
    Ok((body, status))
}
