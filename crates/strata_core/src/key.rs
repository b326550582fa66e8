//! Keys for deduplicating expansion work within one request.

use strata_schema::Expand;

/// A key paired with the expand set it is resolved to.
///
/// The same object expanded to different depths yields different results,
/// so those must never share a slot in the per-request cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpandKey<K> {
    key: K,
    expand: Expand,
}

impl<K> ExpandKey<K> {
    /// Pairs `key` with `expand`.
    pub fn new(key: K, expand: Expand) -> Self {
        Self { key, expand }
    }

    /// The underlying key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The expand set.
    pub fn expand(&self) -> &Expand {
        &self.expand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use strata_storage::RefKey;

    #[test]
    fn different_depths_are_distinct() {
        let shallow = ExpandKey::new(RefKey::new("Post", "p1"), Expand::empty());
        let deep = ExpandKey::new(RefKey::new("Post", "p1"), Expand::parse(["ref"]));
        let again = ExpandKey::new(RefKey::new("Post", "p1"), Expand::parse(["ref"]));
        let set: BTreeSet<_> = [shallow, deep, again].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
