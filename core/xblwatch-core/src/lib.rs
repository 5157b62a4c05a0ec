//! Core library for xblwatch: presence snapshot normalization, the
//! status-transition session tracker, and the on-disk status checkpoint.
//!
//! Everything in this crate is pure logic over canonical types. Network,
//! signal, and mail plumbing live in the `xblwatch` binary crate.

pub mod config;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod timefmt;
pub mod types;

pub use error::{Result, WatchError};
