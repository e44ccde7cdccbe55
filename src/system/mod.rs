//! Shared state, persisted configuration and the event channel
pub mod config;
pub mod event;
pub mod state;
