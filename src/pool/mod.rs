//! Connection pooling module
//!
//! This module provides:
//! - A caller-supplied [`ConnectionFactory`] contract for dialing and closing
//! - A bounded, insertion-ordered [`IdleQueue`] of reusable connections
//! - The [`Pool`] itself: acquire/release/close with idle-timeout eviction

pub mod connection;
pub mod queue;

pub use connection::{ConnectionFactory, Pool, PoolError};
pub use queue::{IdleEntry, IdleQueue};
