//! cctray - Claude Code usage monitor.
//!
//! Polls the external `ccusage` CLI for the active billing block, shows
//! rotating metrics (cost, burn rate, remaining time, tokens), and raises
//! desktop notifications for token-limit thresholds and session transitions.

pub mod app;
pub mod config;
pub mod exec;
pub mod monitor;
pub mod notify;
pub mod state;
pub mod usage;
