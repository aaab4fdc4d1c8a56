//! Shared application state and persisted tracking.

mod store;
mod tracking;

pub use store::{format_tokens, AppState, DisplayMetric, PollStatus, SharedState};
pub use tracking::{PersistedState, TrackingStore};
