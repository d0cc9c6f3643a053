//! NextGCore MME S1AP task
//!
//! eNB and UE S1AP contexts, their persistence, and the S1AP procedures
//! the MME runs against them.

pub mod config;
pub mod context;
pub mod s1ap_handler;
pub mod s1ap_path;
pub mod sm;
pub mod state;
pub mod state_converter;
pub mod state_manager;
pub mod ta_match;

#[cfg(test)]
mod property_tests;

pub use config::S1apConfig;
pub use s1ap_path::{ChannelSink, RecordingSink, S1apSink};
pub use sm::{Fsm, S1apTask, S1apTaskMessage, S1apTaskState};
pub use state_manager::S1apStateManager;
