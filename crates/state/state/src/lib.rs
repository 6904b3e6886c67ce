pub mod error;
pub mod key;
pub mod store;
pub mod testing;

pub use error::StateError;
pub use key::{KeyKind, Keyspace, StateKey};
pub use store::{RefreshOutcome, SemaphoreOutcome, StateStore};
