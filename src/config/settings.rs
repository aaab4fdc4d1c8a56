use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::state::DisplayMetric;

/// Format accepted for quiet-hours boundaries
static HHMM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("Invalid HHMM_PATTERN regex"));

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Claude Code usage monitor")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Refresh interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Token limit used for threshold notifications
    #[arg(short = 't', long)]
    pub token_limit: Option<u64>,

    /// ccusage command (name or path)
    #[arg(long)]
    pub command: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub subcommand: Option<CliCommand>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Perform a single fetch and print the snapshot as JSON
    Check,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// ccusage command, resolved against common install dirs and PATH
    #[serde(default = "default_command")]
    pub command: String,

    /// Extra arguments appended to every ccusage invocation
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Refresh interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Subprocess timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Seconds each metric stays on display before rotating
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,

    /// Metrics enabled for display rotation
    #[serde(default = "default_metrics")]
    pub metrics: Vec<DisplayMetric>,

    /// Token limit for threshold evaluation (also passed to ccusage)
    #[serde(default)]
    pub token_limit: Option<u64>,

    /// Override for the tracking file location
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Notification settings
    #[serde(default)]
    pub notifications: NotificationSettings,
}

fn default_command() -> String {
    "ccusage".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

fn default_rotation_interval() -> u64 {
    5
}

fn default_metrics() -> Vec<DisplayMetric> {
    vec![
        DisplayMetric::Cost,
        DisplayMetric::BurnRate,
        DisplayMetric::TimeRemaining,
        DisplayMetric::Tokens,
    ]
}

/// Notification-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Enable desktop notifications
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,

    /// Warning threshold in percent of the token limit (0 disables)
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,

    /// Urgent threshold in percent (0 disables)
    #[serde(default = "default_urgent_percent")]
    pub urgent_percent: f64,

    /// Critical threshold in percent (0 disables)
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,

    /// Maximum firings per threshold kind per day
    #[serde(default = "default_per_day_cap")]
    pub per_day_cap: u32,

    /// Default snooze duration in minutes
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: i64,

    /// Notify when a session ends
    #[serde(default = "default_notifications_enabled")]
    pub session_end: bool,

    /// Quiet hours window
    #[serde(default)]
    pub quiet_hours: QuietHoursSettings,
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_warning_percent() -> f64 {
    75.0
}

fn default_urgent_percent() -> f64 {
    85.0
}

fn default_critical_percent() -> f64 {
    95.0
}

fn default_per_day_cap() -> u32 {
    10
}

fn default_snooze_minutes() -> i64 {
    15
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            warning_percent: default_warning_percent(),
            urgent_percent: default_urgent_percent(),
            critical_percent: default_critical_percent(),
            per_day_cap: default_per_day_cap(),
            snooze_minutes: default_snooze_minutes(),
            session_end: default_notifications_enabled(),
            quiet_hours: QuietHoursSettings::default(),
        }
    }
}

impl NotificationSettings {
    /// Parsed quiet-hours window, if enabled and well-formed
    pub fn quiet_hours_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        if !self.quiet_hours.enabled {
            return None;
        }
        let start = parse_hhmm(&self.quiet_hours.start)?;
        let end = parse_hhmm(&self.quiet_hours.end)?;
        Some((start, end))
    }
}

/// Quiet hours window; may cross midnight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursSettings {
    /// Enable quiet hours
    #[serde(default)]
    pub enabled: bool,

    /// Window start, `HH:MM` local time
    #[serde(default = "default_quiet_start")]
    pub start: String,

    /// Window end, `HH:MM` local time
    #[serde(default = "default_quiet_end")]
    pub end: String,
}

fn default_quiet_start() -> String {
    "22:00".to_string()
}

fn default_quiet_end() -> String {
    "08:00".to_string()
}

impl Default for QuietHoursSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

fn parse_hhmm(text: &str) -> Option<NaiveTime> {
    if !HHMM_PATTERN.is_match(text) {
        return None;
    }
    NaiveTime::parse_from_str(text, "%H:%M").ok()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command: default_command(),
            extra_args: Vec::new(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            rotation_interval_secs: default_rotation_interval(),
            metrics: default_metrics(),
            token_limit: None,
            state_file: None,
            notifications: NotificationSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {p:?}"))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {p:?}"));
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("cctray/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/cctray/config.toml")),
            dirs::home_dir().map(|p| p.join(".cctray.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {path:?}"))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {path:?}"));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(interval) = cli.interval {
            self.poll_interval_secs = interval;
        }
        if let Some(token_limit) = cli.token_limit {
            self.token_limit = Some(token_limit);
        }
        if let Some(command) = &cli.command {
            self.command = command.clone();
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL: u64 = 5;
        const MIN_ROTATION_INTERVAL: u64 = 1;
        const MIN_TIMEOUT: u64 = 1;

        if self.poll_interval_secs < MIN_POLL_INTERVAL {
            self.poll_interval_secs = MIN_POLL_INTERVAL;
        }
        if self.rotation_interval_secs < MIN_ROTATION_INTERVAL {
            self.rotation_interval_secs = MIN_ROTATION_INTERVAL;
        }
        if self.timeout_secs < MIN_TIMEOUT {
            self.timeout_secs = MIN_TIMEOUT;
        }
        if self.metrics.is_empty() {
            self.metrics = default_metrics();
        }

        let n = &mut self.notifications;
        n.warning_percent = n.warning_percent.clamp(0.0, 100.0);
        n.urgent_percent = n.urgent_percent.clamp(0.0, 100.0);
        n.critical_percent = n.critical_percent.clamp(0.0, 100.0);
        if n.snooze_minutes < 1 {
            n.snooze_minutes = default_snooze_minutes();
        }

        if n.quiet_hours.enabled && n.quiet_hours_window().is_none() {
            warn!(
                "Ignoring malformed quiet hours window {} - {}",
                n.quiet_hours.start, n.quiet_hours.end
            );
            n.quiet_hours.enabled = false;
        }
    }
}
