//! Redis backend for the shepherd shared store.
//!
//! Implements [`StateStore`] on a `deadpool-redis` pool. Every operation that
//! combines a read with a write runs as a Lua script, so concurrent instances
//! never observe a half-applied decision.
//!
//! | Deployment | Guarantees |
//! |------------|------------|
//! | Single instance | Full mutual exclusion and exact counters |
//! | Sentinel / Cluster | Locks and slots may be lost during failover |
//!
//! The semaphore script touches two keys (the active set and one heartbeat);
//! on Redis Cluster both must hash to the same slot, which the default key
//! namespace does not arrange.
//!
//! [`StateStore`]: shepherd_state::StateStore

mod config;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
