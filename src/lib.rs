//! Client bridge for Jira's SOAP service.
//!
//! [`bridge::JiraSoapBridge`] turns issue tracker operations into SOAP calls
//! and returns flattened key-value records; reference data is cached through
//! [`cache::CacheLayer`].

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod soap;

pub use bridge::{JiraSoapBridge, NewIssue, Record, RecordIndex};
pub use config::Config;
pub use error::BridgeError;
