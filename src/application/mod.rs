//! Application layer containing the payment core's orchestration.
//!
//! The `Ledger` and `PaymentRegistry` each serialize their mutations behind a
//! single `tokio` mutex and checkpoint the touched aggregate before releasing
//! it. The `ConfirmationWorkflow` sequences them and talks to the notifier
//! only after every state change has been applied.

pub mod bootstrap;
pub mod cart_store;
pub mod ledger;
pub mod messages;
pub mod registry;
pub mod scheduler;
pub mod workflow;

use crate::error::{Result, StorefrontError};

/// A state change that is in effect in memory, together with the outcome of
/// writing it to the snapshot store.
///
/// A failed checkpoint does not undo the change: the process stays
/// internally consistent and the write can be retried later.
#[must_use = "a failed checkpoint has to be surfaced to the caller"]
#[derive(Debug)]
pub struct Applied<T> {
    pub value: T,
    pub checkpoint: Result<()>,
}

impl<T> Applied<T> {
    pub fn new(value: T, checkpoint: Result<()>) -> Self {
        Self { value, checkpoint }
    }

    pub fn split(self) -> (T, Result<()>) {
        (self.value, self.checkpoint)
    }

    /// Treats a failed checkpoint as a failure of the whole call.
    pub fn into_result(self) -> Result<T> {
        let Applied { value, checkpoint } = self;
        checkpoint.map(|()| value)
    }
}

/// Collects checkpoint failures across the steps of one workflow call so the
/// remaining side effects still run and the first failure is reported last.
#[derive(Debug, Default)]
pub(crate) struct CheckpointLog {
    first_error: Option<StorefrontError>,
}

impl CheckpointLog {
    pub(crate) fn take<T>(&mut self, applied: Applied<T>) -> T {
        let (value, checkpoint) = applied.split();
        if let Err(e) = checkpoint
            && self.first_error.is_none()
        {
            self.first_error = Some(e);
        }
        value
    }

    pub(crate) fn finish<T>(self, value: T) -> Result<T> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}
