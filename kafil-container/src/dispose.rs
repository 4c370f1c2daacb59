//! Release capability and teardown bookkeeping.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::instance::Instance;

/// Error type returned by [`Dispose::dispose`].
pub type DisposeError = Box<dyn std::error::Error + Send + Sync>;

/// Implemented by services that hold something to release: connections,
/// file handles, unit-of-work transactions.
///
/// The container calls `dispose` exactly once for every instance it
/// created and still owns when the owning scope is torn down. Pre-built
/// instances handed to the container are never disposed by it.
///
/// # Examples
/// ```
/// use kafil_container::dispose::{Dispose, DisposeError};
///
/// struct Connection;
///
/// impl Dispose for Connection {
///     fn dispose(&self) -> Result<(), DisposeError> {
///         // flush and close
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> Result<(), DisposeError>;
}

/// Runs a release hook, turning a panic into an error.
pub(crate) fn guarded(disposer: &dyn Dispose) -> Result<(), DisposeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| disposer.dispose())) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "dispose panicked".to_string());
            Err(message.into())
        }
    }
}

/// One instance whose release failed.
#[derive(Debug)]
pub struct DisposalFailure {
    /// Type the failing instance was stored as.
    pub type_name: &'static str,
    pub error: DisposeError,
}

/// Outcome of tearing down a scope.
///
/// Teardown never stops at the first failure: every owned instance is
/// released, failures are collected here and logged.
#[derive(Debug, Default)]
#[must_use = "disposal failures are only reported through the report"]
pub struct DisposalReport {
    released: usize,
    failures: Vec<DisposalFailure>,
}

impl DisposalReport {
    /// Number of release hooks that ran, failed ones included.
    pub fn released(&self) -> usize {
        self.released
    }

    pub fn failures(&self) -> &[DisposalFailure] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Releases one instance, recording a failure instead of propagating it.
    pub(crate) fn release(&mut self, instance: &Instance) {
        if !instance.is_disposable() {
            return;
        }
        self.released += 1;
        if let Err(error) = instance.release() {
            warn!(service = instance.type_name(), %error, "Dispose failed");
            self.failures.push(DisposalFailure {
                type_name: instance.type_name(),
                error,
            });
        }
    }
}
