use std::collections::BTreeMap;
use strata_codec::Value;

/// A closed, ordered set of string values.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub(crate) name: String,
    pub(crate) slot: usize,
    pub(crate) version: Option<u64>,
    pub(crate) description: Option<String>,
    pub(crate) values: Vec<String>,
    pub(crate) extensions: BTreeMap<String, Value>,
}

impl EnumSchema {
    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared values in order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// True if `value` is a member.
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}
