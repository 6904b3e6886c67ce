//! Single-process [`StateStore`](shepherd_state::StateStore) backend.
//!
//! Useful for tests and for running one instance without Redis. Every
//! coordination guarantee holds within the process; none hold across
//! processes.

mod store;

pub use store::MemoryStateStore;
