//! Failure classification and per-category exponential backoff.

use std::time::Duration;

use crate::exec::FetchError;

/// Delay cap applied near a session boundary, where transient failures are
/// expected and should not be penalized with a long backoff.
const TRANSITION_DELAY_CAP: Duration = Duration::from_secs(5);

/// Window after a session transition during which the cap applies
pub const TRANSITION_WINDOW: Duration = Duration::from_secs(10);

/// Failure category driving the backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    JsonParsing,
    CommandExecution,
    Permission,
    Network,
    Unknown,
}

impl ErrorCategory {
    /// Classify a structured fetch failure
    pub fn classify(err: &FetchError) -> Self {
        match err {
            FetchError::EmptyResponse | FetchError::MalformedResponse(_) => Self::JsonParsing,
            FetchError::Timeout(_) => Self::Network,
            FetchError::PermissionDenied(_) => Self::Permission,
            FetchError::CommandNotFound(_)
            | FetchError::ExecutionFailed(_)
            | FetchError::NoOutput => Self::CommandExecution,
            FetchError::ExecutionInProgress => Self::Unknown,
        }
    }

    /// Keyword fallback for errors that arrive as plain text
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("json") || lower.contains("decode") || lower.contains("parse") {
            Self::JsonParsing
        } else if lower.contains("permission") || lower.contains("denied") {
            Self::Permission
        } else if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("timeout")
        {
            Self::Network
        } else {
            Self::Unknown
        }
    }

    /// Base delay for the first backed-off retry
    fn base_delay(self) -> Duration {
        match self {
            Self::JsonParsing => Duration::from_secs(2),
            Self::CommandExecution => Duration::from_secs(5),
            Self::Permission => Duration::from_secs(10),
            Self::Network => Duration::from_secs(3),
            Self::Unknown => Duration::from_secs(5),
        }
    }

    /// Cap on the exponential delay
    fn max_delay(self) -> Duration {
        match self {
            Self::JsonParsing => Duration::from_secs(30),
            Self::CommandExecution => Duration::from_secs(60),
            Self::Permission => Duration::from_secs(120),
            Self::Network => Duration::from_secs(45),
            Self::Unknown => Duration::from_secs(60),
        }
    }

    /// Short name for status display
    pub fn display_name(self) -> &'static str {
        match self {
            Self::JsonParsing => "json",
            Self::CommandExecution => "exec",
            Self::Permission => "permission",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

/// Capped exponential delay for the given attempt (1-based)
pub fn delay_for(category: ErrorCategory, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = category
        .base_delay()
        .saturating_mul(2u32.saturating_pow(exponent));
    delay.min(category.max_delay())
}

/// Sequential backoff state, owned by the poll loop
#[derive(Debug, Default)]
pub struct BackoffState {
    /// Consecutive failures in the current run
    pub consecutive_errors: u32,
    /// Category of the most recent failure
    pub category: Option<ErrorCategory>,
    /// Delay computed for the most recent failure, if one engaged
    pub current_delay: Option<Duration>,
}

impl BackoffState {
    /// Record a failure and return the retry delay, if backoff engages.
    ///
    /// The first failure in a run retries on the next normal tick (no delay).
    /// A category change starts a fresh run rather than continuing the
    /// previous one. Near a session transition the delay is capped at 5s.
    pub fn record_failure(
        &mut self,
        category: ErrorCategory,
        near_transition: bool,
    ) -> Option<Duration> {
        if self.category != Some(category) {
            self.consecutive_errors = 0;
        }
        self.category = Some(category);
        self.consecutive_errors += 1;

        if self.consecutive_errors <= 1 {
            self.current_delay = None;
            return None;
        }

        let mut delay = delay_for(category, self.consecutive_errors);
        if near_transition {
            delay = delay.min(TRANSITION_DELAY_CAP);
        }
        self.current_delay = Some(delay);
        Some(delay)
    }

    /// A successful fetch unconditionally clears the run
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Whether the loop is in a multi-error backoff cycle
    pub fn in_backoff(&self) -> bool {
        self.consecutive_errors > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_structured() {
        assert_eq!(
            ErrorCategory::classify(&FetchError::MalformedResponse("x".into())),
            ErrorCategory::JsonParsing
        );
        assert_eq!(
            ErrorCategory::classify(&FetchError::EmptyResponse),
            ErrorCategory::JsonParsing
        );
        assert_eq!(
            ErrorCategory::classify(&FetchError::Timeout(30)),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::classify(&FetchError::PermissionDenied("p".into())),
            ErrorCategory::Permission
        );
        assert_eq!(
            ErrorCategory::classify(&FetchError::ExecutionFailed(1)),
            ErrorCategory::CommandExecution
        );
        assert_eq!(
            ErrorCategory::classify(&FetchError::CommandNotFound("c".into())),
            ErrorCategory::CommandExecution
        );
    }

    #[test]
    fn test_classify_message_keywords() {
        assert_eq!(
            ErrorCategory::classify_message("failed to parse JSON value"),
            ErrorCategory::JsonParsing
        );
        assert_eq!(
            ErrorCategory::classify_message("Permission denied (os error 13)"),
            ErrorCategory::Permission
        );
        assert_eq!(
            ErrorCategory::classify_message("connection refused"),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::classify_message("something else entirely"),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        // commandExecution: base 5s, cap 60s
        assert_eq!(
            delay_for(ErrorCategory::CommandExecution, 1),
            Duration::from_secs(5)
        );
        assert_eq!(
            delay_for(ErrorCategory::CommandExecution, 3),
            Duration::from_secs(20)
        );
        assert_eq!(
            delay_for(ErrorCategory::CommandExecution, 10),
            Duration::from_secs(60)
        );
        // permission: base 10s, cap 120s
        assert_eq!(
            delay_for(ErrorCategory::Permission, 4),
            Duration::from_secs(80)
        );
        assert_eq!(
            delay_for(ErrorCategory::Permission, 40),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_first_failure_has_no_delay() {
        let mut state = BackoffState::default();
        let delay = state.record_failure(ErrorCategory::Network, false);
        assert_eq!(delay, None);
        assert_eq!(state.consecutive_errors, 1);
        assert!(!state.in_backoff());
    }

    #[test]
    fn test_second_failure_engages_backoff() {
        let mut state = BackoffState::default();
        state.record_failure(ErrorCategory::Network, false);
        let delay = state.record_failure(ErrorCategory::Network, false);
        assert_eq!(delay, Some(Duration::from_secs(6)));
        assert!(state.in_backoff());
    }

    #[test]
    fn test_category_change_starts_fresh_run() {
        let mut state = BackoffState::default();
        state.record_failure(ErrorCategory::Network, false);
        state.record_failure(ErrorCategory::Network, false);
        state.record_failure(ErrorCategory::Network, false);
        assert_eq!(state.consecutive_errors, 3);

        let delay = state.record_failure(ErrorCategory::JsonParsing, false);
        assert_eq!(state.consecutive_errors, 1);
        assert_eq!(delay, None);
    }

    #[test]
    fn test_transition_window_caps_delay() {
        let mut state = BackoffState::default();
        for _ in 0..5 {
            state.record_failure(ErrorCategory::Permission, false);
        }
        // 10 * 2^5 would exceed the cap of 120 anyway; near a transition
        // the delay collapses to 5s regardless of category.
        let delay = state.record_failure(ErrorCategory::Permission, true);
        assert_eq!(delay, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_success_resets_state() {
        let mut state = BackoffState::default();
        state.record_failure(ErrorCategory::Network, false);
        state.record_failure(ErrorCategory::Network, false);
        state.record_success();
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.category, None);
        assert_eq!(state.current_delay, None);
    }
}
