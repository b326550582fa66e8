//! Consistency levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How strongly a storage guarantees an operation, weakest first.
///
/// Levels are ordered: a storage that supports `Quorum` also satisfies any
/// request for `Eventual`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consistency {
    /// Not supported at all.
    None,
    /// Applied at some later point, possibly never observed.
    Async,
    /// Visible eventually.
    Eventual,
    /// Acknowledged by a quorum.
    Quorum,
    /// Visible atomically with the write.
    #[default]
    Atomic,
}

impl Consistency {
    /// True if this level meets `required`.
    pub fn satisfies(self, required: Consistency) -> bool {
        self >= required
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Async => "ASYNC",
            Self::Eventual => "EVENTUAL",
            Self::Quorum => "QUORUM",
            Self::Atomic => "ATOMIC",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(Consistency::None < Consistency::Async);
        assert!(Consistency::Async < Consistency::Eventual);
        assert!(Consistency::Eventual < Consistency::Quorum);
        assert!(Consistency::Quorum < Consistency::Atomic);
        assert!(Consistency::Atomic.satisfies(Consistency::Eventual));
        assert!(!Consistency::Async.satisfies(Consistency::Quorum));
    }

    #[test]
    fn serde_uses_upper_case() {
        assert_eq!(
            serde_json::to_string(&Consistency::Quorum).unwrap(),
            "\"QUORUM\""
        );
        assert_eq!(
            serde_json::from_str::<Consistency>("\"EVENTUAL\"").unwrap(),
            Consistency::Eventual
        );
    }
}
