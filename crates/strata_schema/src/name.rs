//! Dotted member paths and expand sets.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A dotted path through nested members, such as `author.org.name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Vec<String>);

impl Name {
    /// Parses a dotted path. Empty segments are skipped.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Builds a path from its segments.
    pub fn of<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the segments.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns the first segment.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Returns the path without its first segment.
    #[must_use]
    pub fn rest(&self) -> Self {
        Self(self.0.iter().skip(1).cloned().collect())
    }

    /// Returns a path with `child` appended.
    #[must_use]
    pub fn with(&self, child: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(child.into());
        Self(parts)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

/// The set of member paths a reader asked to have expanded.
///
/// `{"author", "author.org"}` expands the `author` reference and, inside
/// it, the `org` reference. Paths that are not listed are left collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expand(BTreeSet<Name>);

impl Expand {
    /// The empty expand set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses each dotted path into an expand set.
    pub fn parse<S: AsRef<str>>(paths: impl IntoIterator<Item = S>) -> Self {
        Self(
            paths
                .into_iter()
                .map(|p| Name::parse(p.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        )
    }

    /// True if nothing is expanded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the expanded paths.
    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.0.iter()
    }

    /// Adds a path.
    pub fn insert(&mut self, name: Name) {
        if !name.is_empty() {
            self.0.insert(name);
        }
    }

    /// Returns the union of two expand sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// True if `member` is expanded at this level.
    pub fn contains(&self, member: &str) -> bool {
        self.0.iter().any(|n| n.first() == Some(member))
    }

    /// Returns the expand set nested under `member`, or `None` if `member`
    /// is not expanded.
    pub fn child(&self, member: &str) -> Option<Self> {
        self.contains(member).then(|| {
            Self(
                self.0
                    .iter()
                    .filter(|n| n.first() == Some(member))
                    .map(Name::rest)
                    .filter(|n| !n.is_empty())
                    .collect(),
            )
        })
    }

    /// Splits the set by first segment into the nested expand sets.
    pub fn branch(&self) -> BTreeMap<String, Self> {
        let mut out: BTreeMap<String, Self> = BTreeMap::new();
        for name in &self.0 {
            if let Some(first) = name.first() {
                out.entry(first.to_string()).or_default().insert(name.rest());
            }
        }
        out
    }
}

impl FromIterator<Name> for Expand {
    fn from_iter<I: IntoIterator<Item = Name>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|n| !n.is_empty()).collect())
    }
}

impl fmt::Display for Expand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl Serialize for Expand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Expand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<Name>::deserialize(deserializer)?;
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_parse_and_display() {
        let name = Name::parse("author.org.name");
        assert_eq!(name.len(), 3);
        assert_eq!(name.first(), Some("author"));
        assert_eq!(name.rest().to_string(), "org.name");
        assert_eq!(name.to_string(), "author.org.name");
    }

    #[test]
    fn expand_child_strips_prefix() {
        let expand = Expand::parse(["ref", "ref.ref", "author"]);
        assert_eq!(expand.child("ref"), Some(Expand::parse(["ref"])));
        assert_eq!(expand.child("author"), Some(Expand::empty()));
        assert_eq!(expand.child("tags"), None);
    }

    #[test]
    fn expand_branch_groups_by_first_segment() {
        let expand = Expand::parse(["a.b", "a.c", "d"]);
        let branches = expand.branch();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches["a"], Expand::parse(["b", "c"]));
        assert!(branches["d"].is_empty());
    }

    #[test]
    fn expand_serializes_as_list() {
        let expand = Expand::parse(["b", "a.c"]);
        let json = serde_json::to_string(&expand).unwrap();
        assert_eq!(json, r#"["a.c","b"]"#);
        let back: Expand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expand);
    }
}
