//! Cadence kernel.
//!
//! Thread-backed scheduling and notification primitives:
//!
//! - **[`pacer`]** -- The pause/resume/cancel state machine and sliced wait
//!   shared by both schedulers.
//! - **[`interval`]** -- [`RecurringScheduler`], which runs a callback on a
//!   drift-corrected cadence.
//! - **[`timeout`]** -- [`OneShotScheduler`], which runs a callback once
//!   after a delay.
//! - **[`bus`]** -- [`EventBus`], a closed-set typed publish/subscribe
//!   registry with synchronous and fire-and-forget dispatch.
//! - **[`subscription`]** -- [`SubscriptionHandle`], the drop-based,
//!   idempotent unsubscribe token.
//! - **[`registry`]** -- [`SchedulerRegistry`], a [`DashMap`](dashmap::DashMap)
//!   backed composition root for named schedulers.
//! - **[`config`]** / **[`error`]** / **[`outcome`]** -- Timing knobs, the
//!   unified [`KernelError`], and the `(status, value, message)` carrier.
//!
//! Every scheduler owns one OS thread while active and every
//! [`EventBus::dispatch_async`] call spawns one more.  That is fine for tens
//! of schedulers; it is not a timer wheel.

pub mod bus;
pub mod config;
pub mod error;
pub mod interval;
pub mod outcome;
pub mod pacer;
pub mod registry;
pub mod subscription;
pub mod timeout;

// Re-export the most commonly used types at the crate root for convenience.
pub use bus::{EventBus, EventSet, Member};
pub use config::TimingConfig;
pub use error::{KernelError, Result};
pub use interval::{RecurringConfig, RecurringScheduler, TickFn};
pub use outcome::{Outcome, Status};
pub use pacer::{CancellablePacer, PacerContext, PacerState, WaitOutcome};
pub use registry::{ManagedScheduler, SchedulerInfo, SchedulerKind, SchedulerRegistry};
pub use subscription::SubscriptionHandle;
pub use timeout::{FireFn, OneShotConfig, OneShotScheduler};
