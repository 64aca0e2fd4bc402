//! Uniform operation outcome.
//!
//! [`Outcome`] is the `(status, value, message)` triple that callers who do
//! not want to match on [`KernelError`] can consume instead.  It is produced
//! from any kernel [`Result`] via `From`, so it never carries information the
//! underlying result did not.

use serde::Serialize;

use crate::error::Result;

/// Severity attached to an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Good,
    Bad,
    Info,
    Debug,
    Warning,
    Exception,
    Error,
}

/// Status, optional value, and optional message of a finished operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub status: Status,
    pub value: Option<T>,
    pub message: Option<String>,
}

impl<T> Outcome<T> {
    /// A successful outcome carrying `value`.
    pub fn good(value: T) -> Self {
        Self {
            status: Status::Good,
            value: Some(value),
            message: None,
        }
    }

    /// A failed outcome with no value.
    pub fn bad(message: impl Into<String>) -> Self {
        Self {
            status: Status::Bad,
            value: None,
            message: Some(message.into()),
        }
    }

    /// Attach or replace the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_good(&self) -> bool {
        self.status == Status::Good
    }

    /// Convert back into a plain `Option`, discarding status and message.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// `Ok` for a `Good` outcome carrying a value, otherwise `Err` with the
    /// message (or the status name when there is none).
    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.status, self.value) {
            (Status::Good, Some(value)) => Ok(value),
            (status, _) => Err(self.message.unwrap_or_else(|| format!("{status:?}"))),
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::good(value),
            Err(err) => Self::bad(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;

    #[test]
    fn ok_maps_to_good() {
        let outcome: Outcome<u32> = Ok(7).into();
        assert!(outcome.is_good());
        assert_eq!(outcome.value, Some(7));
        assert!(outcome.message.is_none());
    }

    #[test]
    fn into_result_splits_on_status() {
        assert_eq!(Outcome::good(3).into_result(), Ok(3));
        assert_eq!(
            Outcome::<u32>::bad("no worker").into_result(),
            Err("no worker".to_string())
        );

        let empty = Outcome::<u32> {
            status: Status::Good,
            value: None,
            message: None,
        };
        assert_eq!(empty.into_result(), Err("Good".to_string()));

        let warned = Outcome {
            status: Status::Warning,
            value: Some(1),
            message: Some("late".into()),
        };
        assert_eq!(warned.into_result(), Err("late".to_string()));
    }

    #[test]
    fn err_maps_to_bad_with_message() {
        let outcome: Outcome<()> = Err(KernelError::AlreadyRunning {
            name: "heartbeat".into(),
        })
        .into();
        assert_eq!(outcome.status, Status::Bad);
        assert!(outcome.value.is_none());
        assert_eq!(
            outcome.message.as_deref(),
            Some("scheduler `heartbeat` is already running")
        );
    }

    #[test]
    fn with_message_keeps_value() {
        let outcome = Outcome::good("x").with_message("started");
        assert!(outcome.is_good());
        assert_eq!(outcome.message.as_deref(), Some("started"));
        assert_eq!(outcome.into_value(), Some("x"));
    }

    #[test]
    fn serializes_status_by_name() {
        let json = serde_json::to_string(&Outcome::<u8>::bad("nope")).expect("serialize");
        assert!(json.contains("\"status\":\"Bad\""));
        assert!(json.contains("\"message\":\"nope\""));
    }
}
