//! NextGCore Database Interface Library
//!
//! Key/value persistence used by tasks that checkpoint their state.

pub mod kvstore;


pub use kvstore::{glob_match, InMemoryKvStore, KvResult, KvStore, KvStoreError};
