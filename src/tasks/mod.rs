//! Background Tasks Module
//!
//! Contains background tasks shared by every cache in the process.
//!
//! # Tasks
//! - Expiration sweeper: periodically removes expired entries from all registered caches

mod sweeper;

pub use sweeper::{is_shut_down, registered_caches, shutdown};
pub(crate) use sweeper::{register, Sweep, SweepHandle};

#[cfg(test)]
pub(crate) use sweeper::is_registered;
