//! Database configuration.

use serde::Deserialize;
use strata_schema::Consistency;
use strata_storage::Versioning;

/// Configuration for a [`crate::Database`].
///
/// Embedders that load settings from files can deserialize this directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Page size when a query does not ask for one.
    pub default_count: usize,

    /// Upper bound on any requested page size.
    pub max_count: usize,

    /// Page size for expanded links.
    pub link_count: usize,

    /// Consistency requested for reads and queries.
    pub read_consistency: Consistency,

    /// Consistency requested for writes.
    pub write_consistency: Consistency,

    /// Version checking for writes.
    pub versioning: Versioning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_count: 10,
            max_count: 100,
            link_count: 10,
            read_consistency: Consistency::Atomic,
            write_consistency: Consistency::Atomic,
            versioning: Versioning::Checked,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_count(mut self, count: usize) -> Self {
        self.default_count = count;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_count(mut self, count: usize) -> Self {
        self.max_count = count;
        self
    }

    /// Sets the page size for expanded links.
    #[must_use]
    pub const fn link_count(mut self, count: usize) -> Self {
        self.link_count = count;
        self
    }

    /// Sets the read consistency.
    #[must_use]
    pub const fn read_consistency(mut self, consistency: Consistency) -> Self {
        self.read_consistency = consistency;
        self
    }

    /// Sets the write consistency.
    #[must_use]
    pub const fn write_consistency(mut self, consistency: Consistency) -> Self {
        self.write_consistency = consistency;
        self
    }

    /// Sets write versioning.
    #[must_use]
    pub const fn versioning(mut self, versioning: Versioning) -> Self {
        self.versioning = versioning;
        self
    }

    /// The page size to use for a requested count.
    #[must_use]
    pub fn page_count(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_count).min(self.max_count)
    }
}
