//! Coordination primitives built on a shared [`StateStore`].
//!
//! Every primitive here is safe to use from many processes at once as long
//! as they share the store. Not being granted a lock, a semaphore slot, a
//! rate-limit token or a quota slot is reported as `Ok(false)` (or
//! [`CoordinationError::LockHeld`] for the plain lock contract), never as an
//! infrastructure failure.
//!
//! [`StateStore`]: shepherd_state::StateStore

pub mod error;
pub mod lock;
pub mod quota;
pub mod ratelimit;
pub mod semaphore;

pub use error::CoordinationError;
pub use lock::{ExclusionLock, LockHandle};
pub use quota::QuotaCounter;
pub use ratelimit::{LocalRateLimiter, RateLimitConfig, RateLimiter, SharedRateLimiter};
pub use semaphore::{TrackerPermit, TrackerSemaphore};
