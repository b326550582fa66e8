//! Backend capability declarations.

use serde::{Deserialize, Serialize};
use strata_schema::Consistency;

use crate::error::{StorageError, StorageResult};

/// The optimistic-concurrency discipline applied to writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Versioning {
    /// `before` versions must match the stored version.
    #[default]
    Checked,
    /// Version checks are skipped.
    Unchecked,
}

/// How a backend detects conflicting writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConcurrencyControl {
    /// Last write wins.
    None,
    /// Version compare on commit.
    #[default]
    Optimistic,
}

/// What a backend supports for one schema.
///
/// Callers (and the conformance tests) consult these instead of assuming
/// every backend behaves the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTraits {
    /// Strongest consistency for object reads and writes.
    pub object_consistency: Consistency,
    /// Strongest consistency for version history.
    pub history_consistency: Consistency,
    /// Strongest consistency for single-value indexes.
    pub single_value_index_consistency: Consistency,
    /// Strongest consistency for multi-value indexes.
    pub multi_value_index_consistency: Consistency,
    /// Subtypes can be read through their base schema.
    pub polymorphic: bool,
    /// A write transaction may touch several objects atomically.
    pub multi_object: bool,
    /// Conflict detection.
    pub concurrency: ConcurrencyControl,
}

impl Default for StorageTraits {
    fn default() -> Self {
        Self {
            object_consistency: Consistency::Atomic,
            history_consistency: Consistency::Atomic,
            single_value_index_consistency: Consistency::Atomic,
            multi_value_index_consistency: Consistency::Atomic,
            polymorphic: true,
            multi_object: true,
            concurrency: ConcurrencyControl::Optimistic,
        }
    }
}

impl StorageTraits {
    /// Checks that object operations can run at `consistency`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] if they cannot.
    pub fn check_object(&self, consistency: Consistency) -> StorageResult<()> {
        if self.object_consistency.satisfies(consistency) {
            Ok(())
        } else {
            Err(StorageError::unsupported(format!(
                "{consistency} object consistency (strongest is {})",
                self.object_consistency
            )))
        }
    }

    /// Checks that a write can run under `versioning`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for checked writes without
    /// optimistic concurrency control.
    pub fn check_versioning(&self, versioning: Versioning) -> StorageResult<()> {
        match (versioning, self.concurrency) {
            (Versioning::Checked, ConcurrencyControl::None) => Err(StorageError::unsupported(
                "checked versioning without concurrency control",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_traits_support_everything() {
        let traits = StorageTraits::default();
        assert!(traits.check_object(Consistency::Atomic).is_ok());
        assert!(traits.check_versioning(Versioning::Checked).is_ok());
    }

    #[test]
    fn weaker_backend_rejects_stronger_requests() {
        let traits = StorageTraits {
            object_consistency: Consistency::Eventual,
            concurrency: ConcurrencyControl::None,
            ..StorageTraits::default()
        };
        assert!(traits.check_object(Consistency::Async).is_ok());
        assert!(matches!(
            traits.check_object(Consistency::Quorum),
            Err(StorageError::Unsupported(_))
        ));
        assert!(traits.check_versioning(Versioning::Unchecked).is_ok());
        assert!(traits.check_versioning(Versioning::Checked).is_err());
    }
}
