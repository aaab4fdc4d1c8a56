//! Usage poll loop.
//!
//! One task owns all monitor state and drives a 1-second tick: countdown to
//! the next fetch, metric rotation, session-transition detection, and the
//! backoff schedule for failed fetches. Results flow to the app loop over an
//! mpsc channel.

use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backoff::{BackoffState, ErrorCategory, TRANSITION_WINDOW};
use crate::config::Settings;
use crate::notify::{date_string, ThresholdNotification, ThresholdNotifier};
use crate::state::{PersistedState, SharedState, TrackingStore};
use crate::usage::{UsageFetcher, UsageSnapshot};

/// Message sent from poller to the app loop
#[derive(Debug)]
pub enum PollMessage {
    /// New usage snapshot
    Updated(UsageSnapshot),
    /// Fetch failed; already classified and recorded
    Error {
        message: String,
        category: ErrorCategory,
    },
    /// A token threshold fired
    Threshold(ThresholdNotification),
    /// The previously active session ended
    SessionEnded { session_id: String },
}

/// Poller for ccusage snapshots
pub struct Poller {
    settings: Settings,
    state: SharedState,
    fetcher: UsageFetcher,
    notifier: ThresholdNotifier,
    store: TrackingStore,
    persisted: PersistedState,
    backoff: BackoffState,
    /// Id of the active block seen in the previous poll
    last_active_id: Option<String>,
    /// When the last session start/end transition was observed
    last_transition_at: Option<Instant>,
    /// Scheduled backoff retry, outside the normal tick
    retry_at: Option<Instant>,
}

impl Poller {
    /// Create a new poller, restoring persisted tracking state
    pub fn new(settings: Settings, state: SharedState) -> Self {
        let store = match &settings.state_file {
            Some(path) => TrackingStore::with_path(path.clone()),
            None => TrackingStore::new(),
        };
        let persisted = store.load();

        let day = if persisted.day.is_empty() {
            date_string(Local::now())
        } else {
            persisted.day.clone()
        };
        let notifier = ThresholdNotifier::from_saved(
            persisted.thresholds.clone(),
            persisted.snoozes.clone(),
            persisted.disabled_at,
            day,
        );
        let last_active_id = persisted.last_active_session_id.clone();
        let fetcher = UsageFetcher::new(&settings);

        Self {
            settings,
            state,
            fetcher,
            notifier,
            store,
            persisted,
            backoff: BackoffState::default(),
            last_active_id,
            last_transition_at: None,
            retry_at: None,
        }
    }

    /// Start polling in a background task
    pub fn start(self) -> mpsc::Receiver<PollMessage> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            self.run(tx).await;
        });

        rx
    }

    /// Run the polling loop
    async fn run(mut self, tx: mpsc::Sender<PollMessage>) {
        let interval = self.settings.poll_interval_secs;
        let mut rotation_left = self.settings.rotation_interval_secs;

        // Immediate first fetch so the display is populated without delay
        self.set_countdown(interval);
        self.fetch_once(&tx).await;

        loop {
            if !self.state.read().running {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !self.state.read().running {
                break;
            }

            // Metric rotation runs on its own cadence and never affects
            // fetch scheduling
            rotation_left = rotation_left.saturating_sub(1);
            if rotation_left == 0 {
                rotation_left = self.settings.rotation_interval_secs;
                let mut state = self.state.write();
                state.metric = state.metric.next_enabled(&self.settings.metrics);
            }

            // Delayed retry scheduled by backoff fires outside the normal
            // countdown
            if let Some(at) = self.retry_at {
                if Instant::now() >= at {
                    self.retry_at = None;
                    self.fetch_once(&tx).await;
                    continue;
                }
            }

            let remaining = {
                let mut state = self.state.write();
                let secs = &mut state.poll.seconds_until_refresh;
                *secs = secs.saturating_sub(1);
                *secs
            };

            if remaining == 0 {
                if self.backoff.in_backoff() {
                    // Multi-error cycle: the retry is scheduled separately;
                    // skip this tick and restart the countdown
                    debug!("Tick skipped during backoff cycle");
                    self.set_countdown(interval);
                } else {
                    self.fetch_once(&tx).await;
                }
            }
        }

        self.shutdown();
    }

    /// One fetch attempt, with all bookkeeping
    async fn fetch_once(&mut self, tx: &mpsc::Sender<PollMessage>) {
        let interval = self.settings.poll_interval_secs;
        self.state.write().poll.fetching = true;

        let result = self.fetcher.fetch().await;
        match result {
            Ok(snapshot) => {
                self.backoff.record_success();
                self.detect_transitions(&snapshot, tx).await;
                self.evaluate_thresholds(&snapshot, tx).await;

                {
                    let mut state = self.state.write();
                    state.snapshot = Some(snapshot.clone());
                    state.last_error = None;
                    state.poll.fetching = false;
                    state.poll.consecutive_errors = 0;
                    state.poll.last_error_category = None;
                    state.poll.current_backoff_delay = None;
                    state.poll.seconds_until_refresh = interval;
                }

                if tx.send(PollMessage::Updated(snapshot)).await.is_err() {
                    self.state.write().running = false;
                }
            }
            Err(e) => {
                let category = ErrorCategory::classify(&e);
                let near_transition = self
                    .last_transition_at
                    .map(|at| at.elapsed() <= TRANSITION_WINDOW)
                    .unwrap_or(false);

                let delay = self.backoff.record_failure(category, near_transition);
                if let Some(delay) = delay {
                    warn!(
                        "Fetch failed ({}, {} consecutive): retrying in {:?}",
                        category.display_name(),
                        self.backoff.consecutive_errors,
                        delay
                    );
                    self.retry_at = Some(Instant::now() + delay);
                } else {
                    warn!(
                        "Fetch failed ({}): retrying on next tick",
                        category.display_name()
                    );
                }

                {
                    let mut state = self.state.write();
                    state.last_error = Some(e.to_string());
                    state.poll.fetching = false;
                    state.poll.consecutive_errors = self.backoff.consecutive_errors;
                    state.poll.last_error_category = Some(category);
                    state.poll.current_backoff_delay = self.backoff.current_delay;
                    state.poll.seconds_until_refresh = interval;
                }

                let send = tx
                    .send(PollMessage::Error {
                        message: e.to_string(),
                        category,
                    })
                    .await;
                if send.is_err() {
                    self.state.write().running = false;
                }
            }
        }

        self.persist();
    }

    /// Detect session start/end transitions between polls
    async fn detect_transitions(&mut self, snapshot: &UsageSnapshot, tx: &mpsc::Sender<PollMessage>) {
        let new_id = snapshot.active_id().map(str::to_string);

        match (&self.last_active_id, &new_id) {
            (None, Some(id)) => {
                info!("Session started: {id}");
                self.record_session_start(id.clone());
                self.last_transition_at = Some(Instant::now());
            }
            (Some(old), None) => {
                info!("Session ended: {old}");
                let ended = old.clone();
                self.last_transition_at = Some(Instant::now());
                let _ = tx
                    .send(PollMessage::SessionEnded { session_id: ended })
                    .await;
            }
            (Some(old), Some(id)) if old != id => {
                info!("Session rolled over: {old} -> {id}");
                let ended = old.clone();
                self.record_session_start(id.clone());
                self.last_transition_at = Some(Instant::now());
                let _ = tx
                    .send(PollMessage::SessionEnded { session_id: ended })
                    .await;
            }
            _ => {}
        }

        self.last_active_id = new_id.clone();
        self.persisted.last_active_session_id = new_id;
    }

    fn record_session_start(&mut self, id: String) {
        let today = date_string(Local::now());
        if self.persisted.last_session_date.as_deref() != Some(today.as_str()) {
            self.persisted.sessions_started_today = 0;
        }
        self.persisted.sessions_started_today += 1;
        self.persisted.last_session_date = Some(today);
        self.persisted.last_active_session_id = Some(id);
    }

    /// Evaluate the token thresholds against the new snapshot
    async fn evaluate_thresholds(&mut self, snapshot: &UsageSnapshot, tx: &mpsc::Sender<PollMessage>) {
        let Some(block) = &snapshot.block else {
            return;
        };
        let Some(percent) = snapshot.percent_used(self.settings.token_limit) else {
            return;
        };
        let limit = block
            .token_limit_status
            .as_ref()
            .map(|s| s.limit)
            .or(self.settings.token_limit)
            .unwrap_or(0);
        if limit == 0 {
            return;
        }

        if let Some(notification) = self.notifier.evaluate(
            percent,
            block.total_tokens,
            limit,
            &self.settings.notifications,
            Local::now(),
        ) {
            info!(
                "Threshold fired: {} at {:.1}%",
                notification.kind.category_id(),
                notification.percent
            );
            let _ = tx.send(PollMessage::Threshold(notification)).await;
        }
    }

    /// Mirror notifier state into the persisted struct and save it
    fn persist(&mut self) {
        self.persisted.thresholds = self.notifier.tracking().clone();
        self.persisted.snoozes = self.notifier.snoozes().clone();
        self.persisted.disabled_at = self.notifier.disabled_at();
        self.persisted.day = self.notifier.day().to_string();

        if let Err(e) = self.store.save(&self.persisted) {
            warn!("Failed to persist tracking state: {e:#}");
        }
    }

    fn set_countdown(&self, seconds: u64) {
        self.state.write().poll.seconds_until_refresh = seconds;
    }

    /// Reset error/backoff state on stop
    fn shutdown(&mut self) {
        self.backoff = BackoffState::default();
        self.retry_at = None;
        let mut state = self.state.write();
        state.poll.consecutive_errors = 0;
        state.poll.last_error_category = None;
        state.poll.current_backoff_delay = None;
        state.poll.fetching = false;
        debug!("Poller stopped");
    }
}
