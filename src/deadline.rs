//! Caller-supplied deadlines for operations that wait on the backend.

use crate::error::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time after which an operation gives up with [`AppError::Timeout`].
/// `Deadline::none()` waits indefinitely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Deadline { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Deadline { at: Some(instant) }
    }

    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    /// Drive `fut` to completion or fail once the deadline passes. The future is dropped
    /// on expiry, so anything it was initializing is left uninitialized.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match self.at {
            None => fut.await,
            Some(at) => match tokio::time::timeout_at(at, fut).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::debug!(operation, "deadline expired");
                    Err(AppError::Timeout(operation.to_string()))
                }
            },
        }
    }
}
