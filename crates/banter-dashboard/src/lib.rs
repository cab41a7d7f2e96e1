//! # banter-dashboard
//!
//! The control dashboard's view of an owner's queue. [`QueueSynchronizer`]
//! refetches the authoritative list whenever a queue-affecting event arrives
//! on the owner's socket and on a fixed polling interval, and exposes the
//! pending count of the freshest successful fetch.

#![deny(unsafe_code)]

pub mod synchronizer;

pub use synchronizer::{FetchState, QueueSnapshot, QueueSynchronizer};
