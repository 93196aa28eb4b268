use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{AppError, AppResult};
use crate::models::ScrapePayload;

/// Scraping a full batch of cinemas can be very slow; the fetch stage is
/// bounded by this external timeout rather than per-request budgets.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(900);

/// Showtime data source boundary
///
/// The scraper lives in its own address space and is reached through a
/// structured request/response contract. Unavailability is a recoverable
/// batch-level failure, never a crash.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ShowtimeSource: Send + Sync {
    /// Scrapes the programmes of the given cinemas and returns the
    /// structured payload. Any malformed output is a `ScrapeFailed`.
    async fn fetch_showtimes(&self, cinema_ids: &[String]) -> AppResult<ScrapePayload>;

    fn name(&self) -> &'static str;
}

/// Scraper reached by spawning a subprocess and speaking JSON-RPC 2.0 over
/// its stdio, one request per invocation.
pub struct SubprocessScraper {
    command: String,
    script: String,
    timeout: Duration,
}

impl SubprocessScraper {
    pub fn new(command: String, script: String) -> Self {
        Self {
            command,
            script,
            timeout: SCRAPE_TIMEOUT,
        }
    }
}

#[async_trait::async_trait]
impl ShowtimeSource for SubprocessScraper {
    async fn fetch_showtimes(&self, cinema_ids: &[String]) -> AppResult<ScrapePayload> {
        tracing::info!(cinemas = cinema_ids.len(), "Launching scraper");

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": "scrape_cinemas",
                "arguments": { "cinema_ids": cinema_ids }
            }
        });

        let mut child = Command::new(&self.command)
            .arg(&self.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::ScrapeFailed(format!("failed to launch scraper: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", request);
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| AppError::ScrapeFailed(format!("failed to write request: {}", e)))?;
            // Closing stdin signals end-of-input to the scraper
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AppError::ScrapeFailed("scraper timed out".to_string()))?
            .map_err(|e| AppError::ScrapeFailed(format!("scraper I/O error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status.code(), stderr = %stderr, "Scraper exited with error");
            return Err(AppError::ScrapeFailed(format!(
                "scraper exited with status {:?}",
                output.status.code()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = extract_tool_payload(&stdout)?;
        parse_payload(&text)
    }

    fn name(&self) -> &'static str {
        "subprocess-scraper"
    }
}

/// Pulls the tool result text out of the scraper's stdout.
///
/// The scraper may interleave diagnostics with protocol lines; only lines
/// that parse as JSON-RPC 2.0 count, and the last one wins.
fn extract_tool_payload(stdout: &str) -> AppResult<String> {
    let response = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|v| v.get("jsonrpc").and_then(Value::as_str) == Some("2.0"))
        .next_back()
        .ok_or_else(|| {
            AppError::ScrapeFailed("no JSON-RPC response on scraper stdout".to_string())
        })?;

    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown scraper error");
        return Err(AppError::ScrapeFailed(message.to_string()));
    }

    response
        .pointer("/result/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::ScrapeFailed("malformed scraper response".to_string()))
}

/// Parses the tool text as a scrape payload; anything non-conforming is a
/// batch-level failure.
fn parse_payload(text: &str) -> AppResult<ScrapePayload> {
    serde_json::from_str(text)
        .map_err(|e| AppError::ScrapeFailed(format!("non-conforming scrape payload: {}", e)))
}
