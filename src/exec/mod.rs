//! Subprocess execution: executable resolution and timed invocation.

pub mod error;
pub mod resolve;
pub mod runner;

pub use error::FetchError;
pub use resolve::{PathResolver, Resolved};
pub use runner::CommandRunner;
