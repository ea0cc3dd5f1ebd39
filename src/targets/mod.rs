//! Target registry with randomized selection and hot-swappable address lists
//!
//! The registry holds the current list of dialable backend addresses. Reads
//! (selection) take a shared lock; whole-list replacement takes an exclusive
//! lock and is driven by a single background updater task consuming an update
//! channel.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// No target address is currently registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no targets registered")]
pub struct EmptyTargets;

/// Holds the live set of dialable addresses and picks one per dial.
///
/// Each registry owns its own seedable random generator so selection can be
/// made deterministic in tests.
pub struct TargetRegistry {
    targets: RwLock<Vec<String>>,
    rng: Mutex<StdRng>,
}

impl TargetRegistry {
    /// Create a registry seeded from OS entropy
    pub fn new(initial: Vec<String>) -> Self {
        Self {
            targets: RwLock::new(initial),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a registry with a fixed seed for deterministic selection
    pub fn with_seed(initial: Vec<String>, seed: u64) -> Self {
        Self {
            targets: RwLock::new(initial),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick one target uniformly at random from the current list
    pub fn select(&self) -> Result<String, EmptyTargets> {
        let targets = self
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if targets.is_empty() {
            return Err(EmptyTargets);
        }

        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..targets.len())
        };
        Ok(targets[index].clone())
    }

    /// Atomically replace the whole target list.
    ///
    /// A malformed update, one that is empty after dropping blank entries, is
    /// ignored rather than clearing the list, so a bad update from the source
    /// cannot cause a transient outage.
    pub fn replace(&self, new_targets: Vec<String>) {
        let cleaned: Vec<String> = new_targets
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if cleaned.is_empty() {
            warn!("ignoring empty target list update");
            return;
        }

        let mut targets = self
            .targets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(count = cleaned.len(), "replacing target list");
        *targets = cleaned;
    }

    /// Number of currently registered targets
    pub fn len(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the background task that applies list replacements from `updates`.
    ///
    /// The task is the sole writer to the registry. It runs until the update
    /// stream closes or the returned handle is stopped; neither is tied to the
    /// lifecycle of any pool using this registry.
    pub fn spawn_updater(
        self: &Arc<Self>,
        mut updates: mpsc::Receiver<Vec<String>>,
    ) -> TargetUpdater {
        let registry = Arc::clone(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    next = updates.recv() => match next {
                        Some(list) => registry.replace(list),
                        None => break,
                    },
                }
            }
            debug!("target update listener stopped");
        });

        TargetUpdater {
            stop: stop_tx,
            task,
        }
    }
}

/// Handle to the background target-update listener
pub struct TargetUpdater {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TargetUpdater {
    /// Signal the listener to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}
