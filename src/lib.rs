//! rpcpool - reusable client connection pool with randomized target selection
//!
//! The pool hands out connections created by a caller-supplied
//! [`ConnectionFactory`], reclaims them on release, evicts entries that sat
//! idle past the configured timeout, and dials fresh connections against a
//! dynamically replaceable target list.

pub mod config;
pub mod pool;
pub mod targets;

pub use config::{PoolOptions, RetryOptions};
pub use pool::{ConnectionFactory, Pool, PoolError};
pub use targets::{EmptyTargets, TargetRegistry, TargetUpdater};
