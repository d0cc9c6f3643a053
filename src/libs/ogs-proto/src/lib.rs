//! NextGCore Protocol Definitions Library
//!
//! Protobuf records of the MME S1AP task, used for checkpointing and
//! stateless failover.

pub mod s1ap_state;

pub use prost::Message;
pub use s1ap_state::*;
