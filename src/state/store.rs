//! In-memory application state shared between the poller and the app loop.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::monitor::backoff::ErrorCategory;
use crate::usage::UsageSnapshot;

/// Shared state type alias
pub type SharedState = Arc<RwLock<AppState>>;

/// Metric currently shown in the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMetric {
    /// Session cost in USD (default)
    #[default]
    Cost,
    /// Tokens consumed per minute
    BurnRate,
    /// Projected time left in the block
    TimeRemaining,
    /// Total tokens, with percent of limit when configured
    Tokens,
}

impl DisplayMetric {
    /// Get the next metric in cycle
    pub fn next(self) -> Self {
        match self {
            DisplayMetric::Cost => DisplayMetric::BurnRate,
            DisplayMetric::BurnRate => DisplayMetric::TimeRemaining,
            DisplayMetric::TimeRemaining => DisplayMetric::Tokens,
            DisplayMetric::Tokens => DisplayMetric::Cost,
        }
    }

    /// Next metric restricted to the enabled set, wrapping around
    pub fn next_enabled(self, enabled: &[DisplayMetric]) -> Self {
        if enabled.is_empty() {
            return self;
        }
        let mut candidate = self.next();
        for _ in 0..4 {
            if enabled.contains(&candidate) {
                return candidate;
            }
            candidate = candidate.next();
        }
        self
    }

    /// Get display name for the metric
    pub fn display_name(&self) -> &'static str {
        match self {
            DisplayMetric::Cost => "Cost",
            DisplayMetric::BurnRate => "Burn",
            DisplayMetric::TimeRemaining => "Left",
            DisplayMetric::Tokens => "Tokens",
        }
    }

    /// Render the metric value from a snapshot
    pub fn render(&self, snapshot: &UsageSnapshot, token_limit: Option<u64>) -> String {
        let Some(block) = &snapshot.block else {
            return "no active session".to_string();
        };

        match self {
            DisplayMetric::Cost => format!("${:.2}", block.cost_usd),
            DisplayMetric::BurnRate => match &block.burn_rate {
                Some(rate) => format!("{:.0} tok/min", rate.tokens_per_minute),
                None => "-- tok/min".to_string(),
            },
            DisplayMetric::TimeRemaining => match &block.projection {
                Some(p) => {
                    let hours = p.remaining_minutes / 60;
                    let minutes = p.remaining_minutes % 60;
                    if hours > 0 {
                        format!("{hours}h {minutes:02}m left")
                    } else {
                        format!("{minutes}m left")
                    }
                }
                None => "--m left".to_string(),
            },
            DisplayMetric::Tokens => match snapshot.percent_used(token_limit) {
                Some(percent) => {
                    format!("{} tok ({percent:.0}%)", format_tokens(block.total_tokens))
                }
                None => format!("{} tok", format_tokens(block.total_tokens)),
            },
        }
    }
}

/// Compact token count (12345 -> "12.3k")
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}k", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Poll loop status, mirrored here for display
#[derive(Debug, Clone, Default)]
pub struct PollStatus {
    /// Consecutive failures in the current run
    pub consecutive_errors: u32,
    /// Category of the most recent failure
    pub last_error_category: Option<ErrorCategory>,
    /// Backoff delay currently in effect, if any
    pub current_backoff_delay: Option<Duration>,
    /// Countdown to the next scheduled fetch
    pub seconds_until_refresh: u64,
    /// Whether a fetch is currently in flight
    pub fetching: bool,
}

/// Application state
#[derive(Default)]
pub struct AppState {
    /// Whether the monitor is running
    pub running: bool,
    /// Latest usage snapshot, replaced wholesale on each successful poll
    pub snapshot: Option<UsageSnapshot>,
    /// Last human-readable error, cleared on success
    pub last_error: Option<String>,
    /// Poll loop status
    pub poll: PollStatus,
    /// Metric currently displayed
    pub metric: DisplayMetric,
}

impl AppState {
    /// Create shared state ready for a running monitor
    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(AppState {
            running: true,
            ..Default::default()
        }))
    }
}
