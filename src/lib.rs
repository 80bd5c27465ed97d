//! Workspace Hub server library.
//!
//! Real-time message synchronization between human viewers (push channel)
//! and agent processes (poll surface) over a shared append-only message log.

pub mod activity;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod message_log;
pub mod push;
pub mod registry;
pub mod seen;
