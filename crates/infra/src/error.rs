//! Service-level error: domain gate failures plus storage failures.

use thiserror::Error;

use procura_core::DomainError;

use crate::store::StoreError;

/// Error surfaced by the service layer to the API.
///
/// Conflicts are retried internally before they ever reach a caller; a
/// `Store(StoreError::Conflict)` here means retries were exhausted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::not_found(msg))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }
}
