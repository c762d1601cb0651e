//! Aggregate traits shared by the catalog and the stock ledger.

use crate::error::{DomainError, DomainResult};

/// Aggregate root: identity plus a monotonically increasing version.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied since the aggregate was created.
    ///
    /// Stores persist this next to the row and use it for optimistic
    /// concurrency checks on commit.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The row must not exist yet.
    New,
    /// Require the stored row to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::New, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "versión desactualizada (esperada: {self:?}, actual: {actual:?})"
            )))
        }
    }

    /// Expectation for committing a change to an aggregate that was loaded at `version`.
    ///
    /// Version 0 means the aggregate was never persisted.
    pub fn loaded_at(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::New
        } else {
            ExpectedVersion::Exact(version)
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO. Uniqueness checks and stock effects on
/// other aggregates are the dispatcher's job.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Handle a command and apply the resulting events in one step.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_expectation_only_matches_missing_rows() {
        assert!(ExpectedVersion::New.matches(None));
        assert!(!ExpectedVersion::New.matches(Some(1)));
    }

    #[test]
    fn exact_expectation_requires_same_version() {
        assert!(ExpectedVersion::Exact(3).matches(Some(3)));
        assert!(!ExpectedVersion::Exact(3).matches(Some(4)));
        assert!(!ExpectedVersion::Exact(3).matches(None));

        let err = ExpectedVersion::Exact(3).check(Some(4)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn loaded_at_zero_means_new() {
        assert_eq!(ExpectedVersion::loaded_at(0), ExpectedVersion::New);
        assert_eq!(ExpectedVersion::loaded_at(2), ExpectedVersion::Exact(2));
        assert!(ExpectedVersion::Any.matches(None));
    }
}
