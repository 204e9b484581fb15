//! Stagehand CLI
//!
//! Command-line interface for replaying recorded domain event streams
//! through the notifier.

pub mod commands;
pub mod output;
