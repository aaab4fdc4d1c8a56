//! Timed subprocess invocation with full output capture.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::FetchError;
use super::resolve::PathResolver;

/// Default subprocess timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exit code the shell reports for "found but not executable"
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Permission-flavored stderr, case-insensitive
static PERMISSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)permission denied|operation not permitted|eacces|eperm")
        .expect("Invalid PERMISSION_PATTERN regex")
});

/// Runner that resolves a command, executes it, and captures its output
pub struct CommandRunner {
    resolver: PathResolver,
    timeout: Duration,
}

impl CommandRunner {
    /// Create a runner with the default timeout (30s)
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a runner with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            resolver: PathResolver::new(),
            timeout,
        }
    }

    /// Run a command and return its raw stdout bytes.
    ///
    /// The subprocess races against the timeout; on expiry it is killed and
    /// `Timeout` is returned. A failed run through a cached path drops the
    /// cache entry so the next call re-resolves.
    pub async fn run(&self, command: &str, args: &[String]) -> Result<Vec<u8>, FetchError> {
        let resolved = self.resolver.resolve(command)?;
        debug!(
            "Running {} {} (cached: {})",
            resolved.path.display(),
            args.join(" "),
            resolved.from_cache
        );

        let result = self.run_resolved(&resolved.path, args).await;

        if result.is_err() && resolved.from_cache {
            warn!("Run via cached path failed; invalidating cache for '{command}'");
            self.resolver.invalidate(command);
        }

        result
    }

    async fn run_resolved(
        &self,
        path: &std::path::Path,
        args: &[String],
    ) -> Result<Vec<u8>, FetchError> {
        let child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    FetchError::CommandNotFound(path.display().to_string())
                }
                std::io::ErrorKind::PermissionDenied => {
                    FetchError::PermissionDenied(path.display().to_string())
                }
                _ => FetchError::ExecutionFailed(-1),
            })?;

        // kill_on_drop tears the child down when the timeout wins the race
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(_)) => return Err(FetchError::ExecutionFailed(-1)),
            Err(_) => return Err(FetchError::Timeout(self.timeout.as_secs())),
        };

        if output.status.success() {
            if output.stdout.is_empty() {
                return Err(FetchError::NoOutput);
            }
            return Ok(output.stdout);
        }

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if code == EXIT_NOT_EXECUTABLE || PERMISSION_PATTERN.is_match(&stderr) {
            return Err(FetchError::PermissionDenied(path.display().to_string()));
        }

        debug!("Command failed with status {code}: {}", stderr.trim());
        Err(FetchError::ExecutionFailed(code))
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}
