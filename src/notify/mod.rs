//! Token-limit threshold gating and desktop notification delivery.

pub mod sender;
pub mod thresholds;

pub use sender::{Notifier, Urgency};
pub use thresholds::{
    date_string, ThresholdKind, ThresholdNotification, ThresholdNotifier, TrackingEntry,
    SESSION_END_CATEGORY,
};
