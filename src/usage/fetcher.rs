//! High-level usage fetch: run ccusage, validate, repair, decode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::types::{BlocksResponse, UsageSnapshot};
use super::validate::{repair, validate};
use crate::config::Settings;
use crate::exec::{CommandRunner, FetchError};

/// Fetcher for usage snapshots via the external ccusage CLI.
///
/// At most one fetch is in flight at a time; a concurrent call fails fast
/// with `ExecutionInProgress` rather than queuing.
pub struct UsageFetcher {
    runner: CommandRunner,
    command: String,
    extra_args: Vec<String>,
    token_limit: Option<u64>,
    in_flight: AtomicBool,
}

impl UsageFetcher {
    /// Create a fetcher from settings
    pub fn new(settings: &Settings) -> Self {
        Self {
            runner: CommandRunner::with_timeout(Duration::from_secs(settings.timeout_secs)),
            command: settings.command.clone(),
            extra_args: settings.extra_args.clone(),
            token_limit: settings.token_limit,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Fetch the current usage snapshot
    pub async fn fetch(&self) -> Result<UsageSnapshot, FetchError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(FetchError::ExecutionInProgress);
        }
        let result = self.fetch_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn fetch_inner(&self) -> Result<UsageSnapshot, FetchError> {
        let args = self.build_args();
        let bytes = self.runner.run(&self.command, &args).await?;

        let text = match validate(&bytes) {
            Ok(text) => text,
            Err(FetchError::MalformedResponse(original)) => {
                // Best-effort repair of truncated objects; on failure the
                // original validation error is surfaced, not a new one.
                let raw = String::from_utf8_lossy(&bytes);
                match repair(&raw) {
                    Some(fixed) => {
                        warn!("Repaired truncated ccusage output");
                        fixed
                    }
                    None => return Err(FetchError::MalformedResponse(original)),
                }
            }
            Err(e) => return Err(e),
        };

        let response: BlocksResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

        debug!("Fetched {} block(s)", response.blocks.len());
        Ok(UsageSnapshot::from_blocks(response.blocks))
    }

    fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["blocks", "--live", "--json", "--active"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(self.extra_args.iter().cloned());
        if let Some(limit) = self.token_limit {
            args.push("--token-limit".to_string());
            args.push(limit.to_string());
        }
        args
    }
}
