//! NextGCore Core Library
//!
//! Shared building blocks for the control-plane tasks: the keyed state
//! store used for every S1AP table, logging glue and a one-shot timer
//! manager for deferred per-UE actions.

pub mod log;
pub mod map;
pub mod timer;


pub use map::{KeyedMap, MapError, MapResult};
pub use timer::{TimerEntry, TimerMgr, TIMER_INACTIVE_ID};
