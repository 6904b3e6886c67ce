//! Shared types for the shepherd job-coordination core.
//!
//! A [`WorkItem`] is a unit of work discovered by a poller and identified by
//! a stable [`ItemKey`]. Its [`ExclusionScope`] tells the worker which shared
//! primitive guards it: a TTL lock on a single resource, or a slot in an
//! organization's bounded tracker semaphore.

pub mod action;
pub mod item;
pub mod window;

pub use action::ActionType;
pub use item::{ExclusionScope, ItemKey, WorkItem};
pub use window::{WEEK, iso_week_id};
