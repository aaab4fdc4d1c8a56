//! Desktop notification delivery via the platform notifier command.
//!
//! macOS uses `osascript` with `display notification`; Linux uses
//! `notify-send`. Delivery failure is logged and never fatal.

use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::thresholds::{ThresholdKind, ThresholdNotification};

/// Interruption level for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl From<ThresholdKind> for Urgency {
    fn from(kind: ThresholdKind) -> Self {
        match kind {
            ThresholdKind::Warning | ThresholdKind::Urgent => Urgency::Normal,
            ThresholdKind::Critical | ThresholdKind::Exceeded => Urgency::Critical,
        }
    }
}

/// Platform notification backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    MacOs,
    Linux,
}

impl Backend {
    fn detect() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Backend::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Backend::Linux)
        } else {
            None
        }
    }
}

/// Desktop notification sender
pub struct Notifier {
    enabled: bool,
    backend: Option<Backend>,
}

impl Notifier {
    /// Create a sender; disabled when no backend exists for this platform
    pub fn new(enabled: bool) -> Self {
        let backend = Backend::detect();
        if enabled && backend.is_none() {
            warn!("No desktop notification backend for this platform");
        }
        Self { enabled, backend }
    }

    /// Deliver a threshold notification
    pub async fn send_threshold(&self, notification: &ThresholdNotification) {
        self.send(
            notification.kind.category_id(),
            &notification.title,
            &notification.body,
            notification.kind.into(),
        )
        .await;
    }

    /// Deliver a notification with the given category and urgency
    pub async fn send(&self, category: &str, title: &str, body: &str, urgency: Urgency) {
        if !self.enabled {
            return;
        }
        let Some(backend) = self.backend else {
            return;
        };

        let mut command = build_command(backend, category, title, body, urgency);
        debug!("Delivering notification [{category}]: {title}");

        match command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("Notification command exited with {status}"),
            Err(e) => warn!("Failed to run notification command: {e}"),
        }
    }
}

fn build_command(
    backend: Backend,
    category: &str,
    title: &str,
    body: &str,
    urgency: Urgency,
) -> Command {
    match backend {
        Backend::MacOs => {
            let mut script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_osascript(body),
                escape_osascript(title)
            );
            if urgency == Urgency::Critical {
                script.push_str(" sound name \"Basso\"");
            }
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        }
        Backend::Linux => {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--app-name=cctray")
                .arg(format!("--category={category}"))
                .arg(match urgency {
                    Urgency::Normal => "--urgency=normal",
                    Urgency::Critical => "--urgency=critical",
                })
                .arg(title)
                .arg(body);
            cmd
        }
    }
}

/// Escape a string for embedding in a double-quoted AppleScript literal
fn escape_osascript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
