//! Configuration and process wiring for shepherd.
//!
//! Loads `shepherd.toml` into [`config::ShepherdConfig`], builds the shared
//! store, and hands out fully configured work classes through
//! [`coordinator::Coordinator`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod state_factory;
pub mod telemetry;
