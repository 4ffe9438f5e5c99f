//! Acquisition-channel analysis of mobile-game players.
//!
//! Loads player actions, user sources and ad spend, joins them, computes
//! per-source statistics and cost per acquisition, and runs two-sample
//! t-tests on completion time and activity. See `pipeline` for the order
//! in which the stages run.

pub mod aggregator;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod event;
pub mod hypothesis;
pub mod joiner;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod synth;
pub mod types;
