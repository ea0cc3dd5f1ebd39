//! Connection pool with lazy dialing and idle-timeout eviction
//!
//! The pool owns a bounded queue of idle connections and a target registry.
//! Acquire reuses the oldest fresh idle connection or dials a new one against
//! a randomly selected target; release returns a connection to the queue or
//! closes it when the queue is full; close is a one-time Open to Closed
//! transition that drains the queue.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::queue::{IdleEntry, IdleQueue};
use crate::config::PoolOptions;
use crate::targets::{EmptyTargets, TargetRegistry, TargetUpdater};

/// Capacity of the target-update channel
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Error types for pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("pool is closed")]
    Closed,

    #[error("released connection is missing, rejecting")]
    RejectedConnection,

    #[error(transparent)]
    EmptyTargets(#[from] EmptyTargets),

    #[error("factory dial failed: {0}")]
    Factory(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// External collaborator that dials and closes individual connections.
///
/// The pool assumes nothing about the underlying protocol. Dial, read and
/// write timeouts from [`PoolOptions`] are the factory's to enforce, as are
/// the retry/tracing/metrics toggles.
pub trait ConnectionFactory: Send + Sync {
    type Conn: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Dial a new connection to `target`
    fn connect(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Self::Conn, Self::Error>> + Send;

    /// Close a connection previously produced by [`connect`](Self::connect)
    fn disconnect(&self, conn: Self::Conn) -> Result<(), Self::Error>;
}

/// Bounded, concurrency-safe cache of idle connections.
///
/// The queue slot doubles as the pool state: `Some` while open, swapped to
/// `None` on close. The mutex guards that transition; the queue handles its
/// own push/pop synchronization.
pub struct Pool<F: ConnectionFactory> {
    queue: Mutex<Option<Arc<IdleQueue<F::Conn>>>>,
    factory: F,
    registry: Arc<TargetRegistry>,
    updater: Mutex<Option<TargetUpdater>>,
    update_tx: mpsc::Sender<Vec<String>>,
    idle_timeout: Duration,
    options: PoolOptions,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Validate options, start the target-update listener and pre-warm
    /// `initial_capacity` connections.
    ///
    /// A factory failure during pre-warming closes everything created so far
    /// and fails the whole construction.
    pub async fn new(options: PoolOptions, factory: F) -> Result<Self, PoolError> {
        options.validate()?;
        let registry = Arc::new(TargetRegistry::new(options.initial_targets.clone()));
        Self::with_registry(options, factory, registry).await
    }

    /// Like [`Pool::new`] but with a caller-built registry, e.g. one seeded
    /// for deterministic target selection.
    pub async fn with_registry(
        options: PoolOptions,
        factory: F,
        registry: Arc<TargetRegistry>,
    ) -> Result<Self, PoolError> {
        options.validate()?;

        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let updater = registry.spawn_updater(update_rx);

        let pool = Self {
            queue: Mutex::new(Some(Arc::new(IdleQueue::new(options.max_capacity)))),
            factory,
            registry,
            updater: Mutex::new(Some(updater)),
            update_tx,
            idle_timeout: options.idle_timeout(),
            options,
        };

        for _ in 0..pool.options.initial_capacity {
            match pool.dial().await {
                Ok(conn) => {
                    // initial_capacity <= max_capacity, the push cannot overflow
                    if let Some(queue) = pool.current_queue() {
                        let _ = queue.try_push(IdleEntry::new(conn));
                    }
                }
                Err(err) => {
                    pool.close();
                    pool.stop_target_updates().await;
                    return Err(err);
                }
            }
        }

        info!(
            service = %pool.options.service_name,
            prewarmed = pool.options.initial_capacity,
            max_capacity = pool.options.max_capacity,
            "connection pool ready"
        );
        Ok(pool)
    }

    /// Hand out a connection.
    ///
    /// Pops idle entries in queue order, silently closing any that outlived
    /// the idle timeout, and dials a fresh connection once the queue runs
    /// empty. Factory errors propagate to the caller without retries.
    pub async fn acquire(&self) -> Result<F::Conn, PoolError> {
        let queue = self.current_queue().ok_or(PoolError::Closed)?;

        while let Some(entry) = queue.pop() {
            if !self.idle_timeout.is_zero() && entry.age() > self.idle_timeout {
                debug!(
                    age_secs = entry.age().as_secs(),
                    "evicting stale idle connection"
                );
                self.disconnect_quietly(entry.conn);
                continue;
            }
            return Ok(entry.conn);
        }

        self.dial().await
    }

    /// Return a connection to the pool.
    ///
    /// When the pool is closed or the idle queue is full the connection is
    /// closed immediately instead of blocking the caller. Steady-state idle
    /// memory is therefore capped at `max_capacity` while live connections
    /// may transiently overshoot it.
    pub fn release(&self, conn: Option<F::Conn>) -> Result<(), PoolError> {
        let Some(conn) = conn else {
            return Err(PoolError::RejectedConnection);
        };

        // Hold the state lock across the push so it cannot race a close drain
        let overflow = {
            let guard = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                None => Some(conn),
                Some(queue) => match queue.try_push(IdleEntry::new(conn)) {
                    Ok(()) => None,
                    Err(entry) => Some(entry.conn),
                },
            }
        };

        if let Some(conn) = overflow {
            debug!("closing released connection, pool closed or idle queue full");
            self.disconnect_quietly(conn);
        }
        Ok(())
    }

    /// One-time Open to Closed transition.
    ///
    /// Idempotent and safe to call concurrently; drains and closes every
    /// queued connection. Every subsequent acquire fails with
    /// [`PoolError::Closed`].
    pub fn close(&self) {
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(queue) = queue else {
            return;
        };

        let drained = queue.drain();
        info!(drained = drained.len(), "closing connection pool");
        for entry in drained {
            self.disconnect_quietly(entry.conn);
        }
    }

    /// Best-effort snapshot of the number of idle connections
    pub fn idle_count(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Sender for whole-list target replacements
    pub fn target_input(&self) -> mpsc::Sender<Vec<String>> {
        self.update_tx.clone()
    }

    /// Stop the target-update listener.
    ///
    /// Deliberately decoupled from [`Pool::close`]: target updates are
    /// unrelated to connection lifecycle.
    pub async fn stop_target_updates(&self) {
        let updater = self
            .updater
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(updater) = updater {
            updater.stop().await;
        }
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    fn current_queue(&self) -> Option<Arc<IdleQueue<F::Conn>>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn dial(&self) -> Result<F::Conn, PoolError> {
        let target = self.registry.select()?;
        debug!(target = %target, "dialing new connection");
        self.factory
            .connect(&target)
            .await
            .map_err(|err| PoolError::Factory(Box::new(err)))
    }

    fn disconnect_quietly(&self, conn: F::Conn) {
        if let Err(err) = self.factory.disconnect(conn) {
            debug!(error = %err, "error closing connection");
        }
    }
}
