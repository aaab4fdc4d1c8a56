//! Threshold notification gating.
//!
//! Decides whether a token-usage notification may fire for a threshold kind,
//! respecting per-kind cooldowns, a daily cap, snooze, "disable for today",
//! a 1-point delta guard, and quiet hours. All time handling takes an
//! explicit `DateTime<Local>` so tests inject the clock.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::NotificationSettings;
use crate::state::format_tokens;

/// Notification category for session boundaries
pub const SESSION_END_CATEGORY: &str = "session-end";

/// Minimum percent movement since the last firing of a kind
const DELTA_GUARD_POINTS: f64 = 1.0;

/// Token-usage severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Warning,
    Urgent,
    Critical,
    Exceeded,
}

impl ThresholdKind {
    /// All kinds in ascending severity order
    pub fn all() -> [ThresholdKind; 4] {
        [
            ThresholdKind::Warning,
            ThresholdKind::Urgent,
            ThresholdKind::Critical,
            ThresholdKind::Exceeded,
        ]
    }

    /// Notification category identifier
    pub fn category_id(&self) -> &'static str {
        match self {
            ThresholdKind::Warning => "token-limit-warning",
            ThresholdKind::Urgent => "token-limit-urgent",
            ThresholdKind::Critical => "token-limit-critical",
            ThresholdKind::Exceeded => "token-limit-exceeded",
        }
    }

    /// Per-kind cooldown between firings
    pub fn cooldown(&self) -> ChronoDuration {
        match self {
            ThresholdKind::Warning => ChronoDuration::minutes(30),
            ThresholdKind::Urgent => ChronoDuration::minutes(15),
            ThresholdKind::Critical => ChronoDuration::minutes(10),
            ThresholdKind::Exceeded => ChronoDuration::minutes(5),
        }
    }

    /// Whether the snooze action is offered for this kind
    pub fn snoozable(&self) -> bool {
        !matches!(self, ThresholdKind::Exceeded)
    }

    /// Get display name for the kind
    pub fn display_name(&self) -> &'static str {
        match self {
            ThresholdKind::Warning => "Warning",
            ThresholdKind::Urgent => "Urgent",
            ThresholdKind::Critical => "Critical",
            ThresholdKind::Exceeded => "Limit exceeded",
        }
    }
}

/// Per-kind firing history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingEntry {
    /// When this kind last fired
    pub last_fired_at: Option<DateTime<Local>>,
    /// Percent at the last firing
    pub last_fired_percent: Option<f64>,
    /// Firings so far today
    pub count_fired_today: u32,
}

/// A notification the gating logic decided to fire
#[derive(Debug, Clone)]
pub struct ThresholdNotification {
    pub kind: ThresholdKind,
    pub threshold: f64,
    pub percent: f64,
    pub current_tokens: u64,
    pub limit: u64,
    pub title: String,
    pub body: String,
}

/// Gating state for threshold notifications
#[derive(Debug, Default)]
pub struct ThresholdNotifier {
    tracking: HashMap<ThresholdKind, TrackingEntry>,
    snoozes: HashMap<ThresholdKind, DateTime<Local>>,
    disabled_at: Option<DateTime<Local>>,
    /// Local date (`YYYY-MM-DD`) the daily counters belong to
    day: String,
}

impl ThresholdNotifier {
    /// Create a notifier with fresh counters for the given moment
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            day: date_string(now),
            ..Default::default()
        }
    }

    /// Restore from persisted tracking state
    pub fn from_saved(
        tracking: HashMap<ThresholdKind, TrackingEntry>,
        snoozes: HashMap<ThresholdKind, DateTime<Local>>,
        disabled_at: Option<DateTime<Local>>,
        day: String,
    ) -> Self {
        Self {
            tracking,
            snoozes,
            disabled_at,
            day,
        }
    }

    /// Current tracking map, for persistence
    pub fn tracking(&self) -> &HashMap<ThresholdKind, TrackingEntry> {
        &self.tracking
    }

    /// Current snooze map, for persistence
    pub fn snoozes(&self) -> &HashMap<ThresholdKind, DateTime<Local>> {
        &self.snoozes
    }

    /// Disabled-for-today timestamp, for persistence
    pub fn disabled_at(&self) -> Option<DateTime<Local>> {
        self.disabled_at
    }

    /// Date the counters belong to, for persistence
    pub fn day(&self) -> &str {
        &self.day
    }

    /// Evaluate the current usage percent against configured thresholds.
    ///
    /// Returns at most one notification: the highest severity whose value the
    /// percent has crossed, provided every gate for that kind passes. A
    /// returned notification has already been recorded (timestamp, percent,
    /// daily count).
    pub fn evaluate(
        &mut self,
        percent: f64,
        current_tokens: u64,
        limit: u64,
        settings: &NotificationSettings,
        now: DateTime<Local>,
    ) -> Option<ThresholdNotification> {
        self.rollover(now);
        self.purge_snoozes(now);

        if !settings.enabled {
            return None;
        }

        // Disabled-for-today suppresses every kind until the date changes
        if self.disabled_at.is_some() {
            debug!("Threshold evaluation suppressed: disabled for today");
            return None;
        }

        if let Some(window) = settings.quiet_hours_window() {
            if in_quiet_hours(now.time(), window.0, window.1) {
                debug!("Threshold evaluation suppressed: quiet hours");
                return None;
            }
        }

        // Ascending severity; the last crossed threshold wins
        let mut candidate: Option<(ThresholdKind, f64)> = None;
        for kind in ThresholdKind::all() {
            let value = self.threshold_value(kind, settings);
            // 0 disables a kind
            if value <= 0.0 {
                continue;
            }
            if percent >= value {
                candidate = Some((kind, value));
            }
        }
        let (kind, value) = candidate?;

        if !self.gates_pass(kind, percent, settings, now) {
            return None;
        }

        let entry = self.tracking.entry(kind).or_default();
        entry.last_fired_at = Some(now);
        entry.last_fired_percent = Some(percent);
        entry.count_fired_today += 1;

        let remaining = limit.saturating_sub(current_tokens);
        Some(ThresholdNotification {
            kind,
            threshold: value,
            percent,
            current_tokens,
            limit,
            title: format!("Claude Code: {}", kind.display_name()),
            body: format!(
                "{percent:.0}% of token limit used, {} tokens remaining",
                format_tokens(remaining)
            ),
        })
    }

    /// Snooze a kind for N minutes; also pushes its cooldown clock forward
    /// by the same amount.
    pub fn snooze(&mut self, kind: ThresholdKind, minutes: i64, now: DateTime<Local>) {
        let duration = ChronoDuration::minutes(minutes);
        self.snoozes.insert(kind, now + duration);
        if let Some(entry) = self.tracking.get_mut(&kind) {
            if let Some(fired) = entry.last_fired_at {
                entry.last_fired_at = Some(fired + duration);
            }
        }
    }

    /// Suppress all kinds until local-midnight rollover
    pub fn disable_today(&mut self, now: DateTime<Local>) {
        self.disabled_at = Some(now);
    }

    /// Reset daily state when the local date has changed
    fn rollover(&mut self, now: DateTime<Local>) {
        let today = date_string(now);
        if self.day != today {
            debug!("Daily rollover: {} -> {today}", self.day);
            self.day = today;
            self.disabled_at = None;
            for entry in self.tracking.values_mut() {
                entry.count_fired_today = 0;
            }
        }
    }

    /// Drop expired snooze entries
    fn purge_snoozes(&mut self, now: DateTime<Local>) {
        self.snoozes.retain(|_, until| now < *until);
    }

    fn threshold_value(&self, kind: ThresholdKind, settings: &NotificationSettings) -> f64 {
        match kind {
            ThresholdKind::Warning => settings.warning_percent,
            ThresholdKind::Urgent => settings.urgent_percent,
            ThresholdKind::Critical => settings.critical_percent,
            // Exceeded is fixed, not user-configurable
            ThresholdKind::Exceeded => 100.0,
        }
    }

    fn gates_pass(
        &self,
        kind: ThresholdKind,
        percent: f64,
        settings: &NotificationSettings,
        now: DateTime<Local>,
    ) -> bool {
        if let Some(entry) = self.tracking.get(&kind) {
            if entry.count_fired_today >= settings.per_day_cap {
                debug!("{:?} gated: daily cap reached", kind);
                return false;
            }
            if let Some(last_percent) = entry.last_fired_percent {
                if (percent - last_percent).abs() < DELTA_GUARD_POINTS {
                    debug!("{:?} gated: within 1-point delta guard", kind);
                    return false;
                }
            }
            if let Some(fired) = entry.last_fired_at {
                if now - fired < kind.cooldown() {
                    debug!("{:?} gated: cooldown active", kind);
                    return false;
                }
            }
        }

        if let Some(until) = self.snoozes.get(&kind) {
            if now < *until {
                debug!("{:?} gated: snoozed until {until}", kind);
                return false;
            }
        }

        true
    }
}

/// Local date as `YYYY-MM-DD`
pub fn date_string(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Quiet-hours membership; windows may cross midnight.
///
/// An empty window (start == end) never suppresses.
fn in_quiet_hours(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    use std::cmp::Ordering;
    match start.cmp(&end) {
        Ordering::Equal => false,
        Ordering::Less => time >= start && time < end,
        Ordering::Greater => time >= start || time < end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NotificationSettings, QuietHoursSettings};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn settings() -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            warning_percent: 75.0,
            urgent_percent: 85.0,
            critical_percent: 95.0,
            per_day_cap: 10,
            snooze_minutes: 15,
            session_end: true,
            quiet_hours: QuietHoursSettings::default(),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 26, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_warning_fires_at_80_percent() {
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        let fired = notifier
            .evaluate(80.0, 40_000, 50_000, &settings(), at(12, 0))
            .expect("warning should fire");
        assert_eq!(fired.kind, ThresholdKind::Warning);
        assert_eq!(fired.threshold, 75.0);
        assert!(fired.body.contains("80%"));
        assert!(fired.body.contains("10.0k"));
    }

    #[test]
    fn test_highest_crossed_threshold_wins() {
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        let fired = notifier
            .evaluate(96.0, 48_000, 50_000, &settings(), at(12, 0))
            .expect("critical should fire");
        assert_eq!(fired.kind, ThresholdKind::Critical);
    }

    #[test]
    fn test_exceeded_fixed_at_100() {
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        let fired = notifier
            .evaluate(101.0, 51_000, 50_000, &settings(), at(12, 0))
            .expect("exceeded should fire");
        assert_eq!(fired.kind, ThresholdKind::Exceeded);
        assert!(fired.body.contains("0 tokens remaining"));
    }

    #[test]
    fn test_zero_threshold_is_disabled() {
        let mut cfg = settings();
        cfg.warning_percent = 0.0;
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        assert!(notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 0))
            .is_none());
    }

    #[test]
    fn test_below_all_thresholds_is_quiet() {
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        assert!(notifier
            .evaluate(50.0, 25_000, 50_000, &settings(), at(12, 0))
            .is_none());
    }

    #[test]
    fn test_delta_guard_blocks_refire() {
        let cfg = settings();
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 0))
            .expect("first firing");
        // 0.5 points later, within a minute: blocked by the delta guard
        // (and the cooldown) even though 80.5 >= 75
        assert!(notifier
            .evaluate(80.5, 40_250, 50_000, &cfg, at(12, 1))
            .is_none());
    }

    #[test]
    fn test_cooldown_blocks_refire() {
        let cfg = settings();
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 0))
            .expect("first firing");
        // Past the delta guard but inside the 30-minute warning cooldown
        assert!(notifier
            .evaluate(83.0, 41_500, 50_000, &cfg, at(12, 20))
            .is_none());
        // After the cooldown it fires again
        assert!(notifier
            .evaluate(83.0, 41_500, 50_000, &cfg, at(12, 31))
            .is_some());
    }

    #[test]
    fn test_daily_cap() {
        let mut cfg = settings();
        cfg.per_day_cap = 1;
        let mut notifier = ThresholdNotifier::new(at(8, 0));
        notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(8, 0))
            .expect("first firing");
        assert!(notifier
            .evaluate(84.0, 42_000, 50_000, &cfg, at(10, 0))
            .is_none());
    }

    #[test]
    fn test_snooze_suppresses_kind() {
        let cfg = settings();
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        notifier.snooze(ThresholdKind::Warning, 15, at(12, 0));
        assert!(notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 10))
            .is_none());
        // After the snooze expires the kind may fire again
        assert!(notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 16))
            .is_some());
    }

    #[test]
    fn test_snooze_pushes_cooldown_forward() {
        let cfg = settings();
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(12, 0))
            .expect("first firing");
        notifier.snooze(ThresholdKind::Warning, 15, at(12, 1));
        // Cooldown clock moved to 12:15; 30 minutes from there is 12:45
        assert!(notifier
            .evaluate(83.0, 41_500, 50_000, &cfg, at(12, 40))
            .is_none());
        assert!(notifier
            .evaluate(83.0, 41_500, 50_000, &cfg, at(12, 46))
            .is_some());
    }

    #[test]
    fn test_disable_today_until_rollover() {
        let cfg = settings();
        let mut notifier = ThresholdNotifier::new(at(12, 0));
        notifier.disable_today(at(12, 0));
        assert!(notifier
            .evaluate(101.0, 51_000, 50_000, &cfg, at(23, 59))
            .is_none());

        // Next day: counters reset, kinds re-enabled
        let next_day = Local.with_ymd_and_hms(2026, 8, 27, 0, 5, 0).unwrap();
        assert!(notifier
            .evaluate(101.0, 51_000, 50_000, &cfg, next_day)
            .is_some());
    }

    #[test]
    fn test_rollover_resets_daily_counters() {
        let mut cfg = settings();
        cfg.per_day_cap = 1;
        let mut notifier = ThresholdNotifier::new(at(8, 0));
        notifier
            .evaluate(80.0, 40_000, 50_000, &cfg, at(8, 0))
            .expect("first firing");

        let next_day = Local.with_ymd_and_hms(2026, 8, 27, 9, 0, 0).unwrap();
        assert!(notifier
            .evaluate(83.0, 41_500, 50_000, &cfg, next_day)
            .is_some());
    }

    #[test]
    fn test_quiet_hours_plain_window() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(in_quiet_hours(
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            start,
            end
        ));
        assert!(!in_quiet_hours(
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            start,
            end
        ));
    }

    #[test]
    fn test_quiet_hours_crossing_midnight() {
        let start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert!(in_quiet_hours(
            NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
            start,
            end
        ));
        assert!(in_quiet_hours(
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            start,
            end
        ));
        assert!(!in_quiet_hours(
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            start,
            end
        ));
    }

    #[test]
    fn test_quiet_hours_suppress_evaluation() {
        let mut cfg = settings();
        cfg.quiet_hours = QuietHoursSettings {
            enabled: true,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        };
        let mut notifier = ThresholdNotifier::new(at(23, 0));
        assert!(notifier
            .evaluate(90.0, 45_000, 50_000, &cfg, at(23, 0))
            .is_none());
        // Outside the window the same percent fires
        assert!(notifier
            .evaluate(90.0, 45_000, 50_000, &cfg, at(12, 0))
            .is_some());
    }
}
