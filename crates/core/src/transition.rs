//! Status transition tables.
//!
//! Every stateful procurement record (purchase order, goods receipt, invoice,
//! payment) moves through a closed set of statuses. The allowed moves are
//! written down as one explicit table per status enum and checked before any
//! state-changing write. A disallowed move fails with a validation error that
//! names the current status, the requested status, and the full allowed set,
//! so callers never need to re-derive what would have been legal.

use core::fmt;

use crate::error::{DomainError, DomainResult};

/// A status enum with an explicit transition table.
pub trait StatusMachine: Copy + Eq + fmt::Display + Sized + 'static {
    /// Human-readable entity kind, used in error messages ("purchase order").
    const ENTITY: &'static str;

    /// Statuses directly reachable from `self`. Empty means terminal.
    fn transitions(self) -> &'static [Self];

    /// Whether `self` has no outgoing transitions.
    fn is_terminal(self) -> bool {
        self.transitions().is_empty()
    }

    /// Whether `requested` is directly reachable from `self`.
    fn can_transition(self, requested: Self) -> bool {
        self.transitions().contains(&requested)
    }
}

/// Check one requested transition against the entity's table.
pub fn ensure_transition<S: StatusMachine>(current: S, requested: S) -> DomainResult<()> {
    if current.can_transition(requested) {
        return Ok(());
    }

    let allowed = current
        .transitions()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    Err(DomainError::validation(format!(
        "invalid {} status transition: {current} -> {requested} (allowed from {current}: [{allowed}])",
        S::ENTITY
    )))
}
