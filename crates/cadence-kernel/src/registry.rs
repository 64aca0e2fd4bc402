//! Named scheduler registry.
//!
//! The registry is the composition root for schedulers: the application
//! builds each scheduler explicitly, registers it under a name, and passes
//! the registry (or individual `Arc`s) to whoever needs them.  There is no
//! process-wide instance.
//!
//! Internally the registry is backed by [`DashMap`], so lookups from many
//! threads do not contend on a single lock.
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use cadence_kernel::{RecurringConfig, RecurringScheduler, SchedulerRegistry};
//! let registry = SchedulerRegistry::new();
//! let heartbeat = Arc::new(RecurringScheduler::new(
//!     "heartbeat",
//!     RecurringConfig::new(Duration::from_secs(1), |_| true),
//! ));
//! registry.register_recurring(Arc::clone(&heartbeat)).unwrap();
//!
//! assert_eq!(registry.count(), 1);
//! registry.cancel_all();
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KernelError, Result};
use crate::interval::RecurringScheduler;
use crate::pacer::PacerState;
use crate::timeout::OneShotScheduler;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which kind of scheduler an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerKind {
    Recurring,
    OneShot,
}

/// A registered scheduler.
#[derive(Debug, Clone)]
pub enum ManagedScheduler {
    Recurring(Arc<RecurringScheduler>),
    OneShot(Arc<OneShotScheduler>),
}

impl ManagedScheduler {
    pub fn kind(&self) -> SchedulerKind {
        match self {
            Self::Recurring(_) => SchedulerKind::Recurring,
            Self::OneShot(_) => SchedulerKind::OneShot,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Recurring(s) => s.name(),
            Self::OneShot(s) => s.name(),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Recurring(s) => s.id(),
            Self::OneShot(s) => s.id(),
        }
    }

    pub fn state(&self) -> PacerState {
        match self {
            Self::Recurring(s) => s.state(),
            Self::OneShot(s) => s.state(),
        }
    }

    pub fn execution_count(&self) -> u64 {
        match self {
            Self::Recurring(s) => s.execution_count(),
            Self::OneShot(s) => s.execution_count(),
        }
    }

    /// Cancel and join the scheduler's worker.
    pub fn cancel(&self) {
        match self {
            Self::Recurring(s) => s.cancel(),
            Self::OneShot(s) => s.cancel(),
        }
    }
}

/// Point-in-time view of a registered scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerInfo {
    pub name: String,
    pub id: Uuid,
    pub kind: SchedulerKind,
    pub state: PacerState,
    pub execution_count: u64,
    /// When the scheduler was added to the registry.
    pub registered_at: DateTime<Utc>,
}

struct RegistryEntry {
    scheduler: ManagedScheduler,
    registered_at: DateTime<Utc>,
}

impl RegistryEntry {
    fn info(&self) -> SchedulerInfo {
        SchedulerInfo {
            name: self.scheduler.name().to_string(),
            id: self.scheduler.id(),
            kind: self.scheduler.kind(),
            state: self.scheduler.state(),
            execution_count: self.scheduler.execution_count(),
            registered_at: self.registered_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent scheduler registry backed by [`DashMap`].
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct SchedulerRegistry {
    inner: Arc<DashMap<String, RegistryEntry>>,
}

impl SchedulerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recurring scheduler under its own name.
    pub fn register_recurring(&self, scheduler: Arc<RecurringScheduler>) -> Result<()> {
        self.insert(ManagedScheduler::Recurring(scheduler))
    }

    /// Register a one-shot scheduler under its own name.
    pub fn register_one_shot(&self, scheduler: Arc<OneShotScheduler>) -> Result<()> {
        self.insert(ManagedScheduler::OneShot(scheduler))
    }

    /// Look up a recurring scheduler.
    pub fn recurring(&self, name: &str) -> Result<Arc<RecurringScheduler>> {
        match self.get(name)? {
            ManagedScheduler::Recurring(s) => Ok(s),
            ManagedScheduler::OneShot(_) => Err(not_found(name)),
        }
    }

    /// Look up a one-shot scheduler.
    pub fn one_shot(&self, name: &str) -> Result<Arc<OneShotScheduler>> {
        match self.get(name)? {
            ManagedScheduler::OneShot(s) => Ok(s),
            ManagedScheduler::Recurring(_) => Err(not_found(name)),
        }
    }

    /// Look up any scheduler by name.
    pub fn get(&self, name: &str) -> Result<ManagedScheduler> {
        self.inner
            .get(name)
            .map(|entry| entry.scheduler.clone())
            .ok_or_else(|| not_found(name))
    }

    /// Remove a scheduler and cancel it.
    ///
    /// Returns the removed scheduler's final [`SchedulerInfo`].
    pub fn unregister(&self, name: &str) -> Result<SchedulerInfo> {
        let (_, entry) = self.inner.remove(name).ok_or_else(|| not_found(name))?;
        // Cancel outside the map so a slow join does not hold a shard lock.
        entry.scheduler.cancel();
        tracing::info!(scheduler = %name, "scheduler unregistered");
        Ok(entry.info())
    }

    /// Snapshot of one scheduler.
    pub fn info(&self, name: &str) -> Result<SchedulerInfo> {
        self.inner
            .get(name)
            .map(|entry| entry.info())
            .ok_or_else(|| not_found(name))
    }

    /// Snapshot of every registered scheduler.
    pub fn list_all(&self) -> Vec<SchedulerInfo> {
        self.inner.iter().map(|e| e.value().info()).collect()
    }

    /// Names of every registered scheduler.
    pub fn list_names(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    /// Only schedulers currently in `state`.
    pub fn list_by_state(&self, state: PacerState) -> Vec<SchedulerInfo> {
        self.inner
            .iter()
            .map(|e| e.value().info())
            .filter(|info| info.state == state)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Cancel every registered scheduler.  Entries stay registered.
    pub fn cancel_all(&self) {
        let schedulers: Vec<ManagedScheduler> = self
            .inner
            .iter()
            .map(|e| e.value().scheduler.clone())
            .collect();
        tracing::info!(count = schedulers.len(), "cancelling all schedulers");
        for scheduler in schedulers {
            scheduler.cancel();
        }
    }

    // -- Private helpers ----------------------------------------------------

    fn insert(&self, scheduler: ManagedScheduler) -> Result<()> {
        let name = scheduler.name().to_string();
        match self.inner.entry(name.clone()) {
            Entry::Occupied(_) => Err(KernelError::DuplicateScheduler { name }),
            Entry::Vacant(slot) => {
                tracing::info!(
                    scheduler = %name,
                    scheduler_id = %scheduler.id(),
                    kind = ?scheduler.kind(),
                    "scheduler registered"
                );
                slot.insert(RegistryEntry {
                    scheduler,
                    registered_at: Utc::now(),
                });
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRegistry")
            .field("schedulers", &self.list_names())
            .finish()
    }
}

fn not_found(name: &str) -> KernelError {
    KernelError::SchedulerNotFound {
        name: name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
