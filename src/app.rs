//! Headless application loop.
//!
//! Consumes poller messages, keeps the shared state current, renders the
//! rotating status line, and hands fired notifications to the desktop sender.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Settings;
use crate::monitor::{PollMessage, Poller};
use crate::notify::{Notifier, Urgency, SESSION_END_CATEGORY};
use crate::state::{AppState, SharedState};

/// Main application
pub struct App {
    state: SharedState,
    settings: Settings,
    notifier: Notifier,
}

impl App {
    /// Create a new application
    pub fn new(settings: Settings) -> Self {
        let state = AppState::shared();
        let notifier = Notifier::new(settings.notifications.enabled);

        Self {
            state,
            settings,
            notifier,
        }
    }

    /// Run the application until ctrl-c
    pub async fn run(&mut self) -> Result<()> {
        let poller = Poller::new(self.settings.clone(), self.state.clone());
        let mut poll_rx = poller.start();

        let mut render = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
                msg = poll_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }
                _ = render.tick() => {
                    self.render_status();
                }
            }
        }

        self.state.write().running = false;
        println!();
        Ok(())
    }

    async fn handle_message(&mut self, msg: PollMessage) {
        match msg {
            // Shared state is maintained by the poller; snapshot and error
            // messages only need a redraw here
            PollMessage::Updated(_) | PollMessage::Error { .. } => self.render_status(),
            PollMessage::Threshold(notification) => {
                self.notifier.send_threshold(&notification).await;
            }
            PollMessage::SessionEnded { session_id } => {
                if self.settings.notifications.session_end {
                    self.notifier
                        .send(
                            SESSION_END_CATEGORY,
                            "Claude Code session ended",
                            &format!("Billing block {session_id} is no longer active"),
                            Urgency::Normal,
                        )
                        .await;
                }
            }
        }
    }

    /// One-line status: current metric, countdown, last error if any
    fn render_status(&self) {
        let state = self.state.read();
        let line = match (&state.snapshot, &state.last_error) {
            (_, Some(error)) => {
                let backoff = state
                    .poll
                    .current_backoff_delay
                    .map(|d| format!(" (backoff {}s)", d.as_secs()))
                    .unwrap_or_default();
                format!("[!] {error}{backoff}")
            }
            (Some(snapshot), None) => {
                let value = state.metric.render(snapshot, self.settings.token_limit);
                format!(
                    "{}: {} | next refresh {}s",
                    state.metric.display_name(),
                    value,
                    state.poll.seconds_until_refresh
                )
            }
            (None, None) => "Waiting for first fetch...".to_string(),
        };

        print!("\r\x1b[2K{line}");
        let _ = std::io::stdout().flush();
    }
}
