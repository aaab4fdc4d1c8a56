//! Poll loop and error-recovery state machine.

pub mod backoff;
pub mod poller;

pub use backoff::{delay_for, BackoffState, ErrorCategory};
pub use poller::{PollMessage, Poller};
