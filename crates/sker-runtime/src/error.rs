//! Lifecycle error type. Configuration errors live in
//! [`crate::config::error`] — this is just for the steps an
//! [`crate::runtime::ApplicationLifecycle`] runs.

use thiserror::Error;

/// A lifecycle step failed to start or stop.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct RuntimeError(pub String);

/// Result type for lifecycle operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
