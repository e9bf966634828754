//! Optimistic concurrency primitives.

use crate::error::{DomainError, DomainResult};

/// Version expectation attached to a store commit.
///
/// Every mutable procurement record carries a monotonically increasing
/// `version`. Commits state which version they were computed against; a
/// mismatch means another writer landed first and the whole
/// read-validate-write pipeline must be retried.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for idempotent writes, migrations, etc.).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
