//! Kernel error types.
//!
//! Every lifecycle operation in this crate surfaces failures through
//! [`KernelError`].  Callback failures are deliberately absent: a panic inside
//! a scheduler callback is caught on the worker thread and never reaches the
//! caller as an error value.

/// Unified error type for the cadence kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Scheduler errors ---------------------------------------------------
    /// `start()` was called while a worker thread for this scheduler is
    /// still alive.
    #[error("scheduler `{name}` is already running")]
    AlreadyRunning {
        /// Name of the scheduler that rejected the call.
        name: String,
    },

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread for `{name}`: {reason}")]
    ThreadSpawn { name: String, reason: String },

    // -- Configuration errors -----------------------------------------------
    /// A configuration value is out of range or could not be parsed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Registry errors ----------------------------------------------------
    /// No scheduler with this name is registered.
    #[error("scheduler not found: {name}")]
    SchedulerNotFound { name: String },

    /// A scheduler with this name is already registered.
    #[error("scheduler already registered: {name}")]
    DuplicateScheduler { name: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
