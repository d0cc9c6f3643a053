//! NextGCore S1AP Protocol Library
//!
//! S1AP procedure messages, information elements and the inter-task
//! messages of the MME S1AP task (3GPP TS 36.413).

pub mod builder;
pub mod error;
pub mod message;
pub mod pdu;
pub mod types;

pub use builder::*;
pub use error::{S1apError, S1apResult};
pub use message::*;
pub use pdu::*;
pub use types::*;
