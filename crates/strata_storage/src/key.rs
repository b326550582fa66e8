//! Object addressing.

use std::fmt;

/// Identifies one stored object by schema and id.
///
/// The schema is the one the object is read through, which for
/// polymorphic data may be a base of its concrete schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefKey {
    schema: String,
    id: String,
}

impl RefKey {
    /// Creates a key.
    pub fn new(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// Schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Object id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.schema, self.id)
    }
}
