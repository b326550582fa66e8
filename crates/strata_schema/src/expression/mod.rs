//! Expressions used by links, transients, views, permissions and queries.
//!
//! ```text
//! author.id == this.id && !(state in ["draft", "deleted"])
//! ```
//!
//! Expressions are parsed from text, displayed back to equivalent text,
//! bound against an owner instance (`this`) and evaluated against a
//! [`Context`].

mod eval;
mod parser;
mod sort;

pub use eval::Context;
pub use sort::{Order, Sort};

use crate::error::SchemaResult;
use crate::name::Name;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strata_codec::Value;

/// Binary operators, in increasing precedence groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    pub(crate) fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

/// Precedence of `in`; it binds like the relational operators.
const IN_PRECEDENCE: u8 = 4;
const UNARY_PRECEDENCE: u8 = 7;

/// A parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal or bound value.
    Constant(Value),
    /// A member path, resolved against the evaluation context.
    Path(Name),
    /// `[a, b, c]`
    Array(Vec<Expression>),
    /// `!e`
    Not(Box<Expression>),
    /// `-e`
    Negate(Box<Expression>),
    /// `left op right`
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `value in list`
    In {
        /// Tested value.
        value: Box<Expression>,
        /// Candidate list.
        list: Box<Expression>,
    },
    /// `name(args...)`
    Call {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expression>,
    },
}

/// Functions that fold a group of rows into one value.
pub(crate) const AGGREGATES: [&str; 5] = ["count", "sum", "min", "max", "avg"];

impl Expression {
    /// Parses expression text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Expression`](crate::SchemaError::Expression)
    /// with the offending position on malformed input.
    pub fn parse(text: &str) -> SchemaResult<Self> {
        parser::parse(text)
    }

    /// Shorthand for a constant.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Shorthand for a path.
    pub fn path(name: &str) -> Self {
        Self::Path(Name::parse(name))
    }

    /// Shorthand for `left op right`.
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Every member path referenced by this expression.
    pub fn paths(&self) -> BTreeSet<Name> {
        let mut out = BTreeSet::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut BTreeSet<Name>) {
        match self {
            Self::Constant(_) => {}
            Self::Path(name) => {
                out.insert(name.clone());
            }
            Self::Array(items) | Self::Call { args: items, .. } => {
                items.iter().for_each(|e| e.collect_paths(out));
            }
            Self::Not(e) | Self::Negate(e) => e.collect_paths(out),
            Self::Binary { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            Self::In { value, list } => {
                value.collect_paths(out);
                list.collect_paths(out);
            }
        }
    }

    /// Replaces every path whose first segment is a key of `vars` with the
    /// constant found by walking the rest of the path into that value.
    /// Paths that do not resolve become `null`.
    #[must_use]
    pub fn bind(&self, vars: &BTreeMap<String, Value>) -> Self {
        match self {
            Self::Path(name) => match name.first().and_then(|first| vars.get(first)) {
                Some(root) => Self::Constant(
                    root.get_path(&name.parts()[1..])
                        .cloned()
                        .unwrap_or_default(),
                ),
                None => self.clone(),
            },
            Self::Constant(_) => self.clone(),
            Self::Array(items) => Self::Array(items.iter().map(|e| e.bind(vars)).collect()),
            Self::Not(e) => Self::Not(Box::new(e.bind(vars))),
            Self::Negate(e) => Self::Negate(Box::new(e.bind(vars))),
            Self::Binary { op, left, right } => Self::Binary {
                op: *op,
                left: Box::new(left.bind(vars)),
                right: Box::new(right.bind(vars)),
            },
            Self::In { value, list } => Self::In {
                value: Box::new(value.bind(vars)),
                list: Box::new(list.bind(vars)),
            },
            Self::Call { name, args } => Self::Call {
                name: name.clone(),
                args: args.iter().map(|e| e.bind(vars)).collect(),
            },
        }
    }

    /// Binds `this` to `owner`.
    #[must_use]
    pub fn bind_this(&self, owner: &Value) -> Self {
        self.bind(&BTreeMap::from([("this".to_string(), owner.clone())]))
    }

    /// True if an aggregate function appears anywhere in the tree.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Self::Call { name, args } => {
                AGGREGATES.contains(&name.as_str()) || args.iter().any(Self::is_aggregate)
            }
            Self::Constant(_) | Self::Path(_) => false,
            Self::Array(items) => items.iter().any(Self::is_aggregate),
            Self::Not(e) | Self::Negate(e) => e.is_aggregate(),
            Self::Binary { left, right, .. } => left.is_aggregate() || right.is_aggregate(),
            Self::In { value, list } => value.is_aggregate() || list.is_aggregate(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::In { .. } => IN_PRECEDENCE,
            Self::Not(_) | Self::Negate(_) => UNARY_PRECEDENCE,
            _ => u8::MAX,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn fmt_constant(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => {
            f.write_str("\"")?;
            for c in s.chars() {
                match c {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\r' => f.write_str("\\r")?,
                    '\t' => f.write_str("\\t")?,
                    other => write!(f, "{other}")?,
                }
            }
            f.write_str("\"")
        }
        Value::Number(n) => write!(f, "{n:?}"),
        Value::Array(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_constant(item, f)?;
            }
            f.write_str("]")
        }
        Value::Date(_) | Value::DateTime(_) | Value::Binary(_) => {
            fmt_constant(&Value::String(value.to_string()), f)
        }
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => fmt_constant(value, f),
            Self::Path(name) => write!(f, "{name}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Not(e) => {
                f.write_str("!")?;
                e.fmt_operand(f, UNARY_PRECEDENCE)
            }
            Self::Negate(e) => {
                f.write_str("-")?;
                e.fmt_operand(f, UNARY_PRECEDENCE)
            }
            Self::Binary { op, left, right } => {
                let p = op.precedence();
                left.fmt_operand(f, p)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f, p + 1)
            }
            Self::In { value, list } => {
                value.fmt_operand(f, IN_PRECEDENCE + 1)?;
                f.write_str(" in ")?;
                list.fmt_operand(f, IN_PRECEDENCE + 1)
            }
            Self::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl std::str::FromStr for Expression {
    type Err = crate::error::SchemaError;

    fn from_str(text: &str) -> SchemaResult<Self> {
        Self::parse(text)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrips_through_parse() {
        for text in [
            "a == 1 && b != \"x\"",
            "(a || b) && c",
            "a - (b - c)",
            "a - b - c",
            "!(a && b)",
            "-x * 2",
            "state in [\"draft\", \"done\"]",
            "size(tags) > 0 || coalesce(name, \"\") == \"\"",
            "price * 1.5 >= 10.0",
            "text == \"quote \\\" and \\\\ slash\\n\"",
        ] {
            let parsed = Expression::parse(text).unwrap();
            let shown = parsed.to_string();
            assert_eq!(Expression::parse(&shown).unwrap(), parsed, "{text} -> {shown}");
        }
    }

    #[test]
    fn minimal_parentheses() {
        let e = Expression::parse("(a + b) * c").unwrap();
        assert_eq!(e.to_string(), "(a + b) * c");
        let e = Expression::parse("a + (b * c)").unwrap();
        assert_eq!(e.to_string(), "a + b * c");
    }

    #[test]
    fn paths_are_collected() {
        let e = Expression::parse("author.id == this.id && count > 1").unwrap();
        let paths: Vec<String> = e.paths().iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["author.id", "count", "this.id"]);
    }

    #[test]
    fn bind_this_substitutes_constants() {
        let e = Expression::parse("post.id == this.id && this.missing == null").unwrap();
        let bound = e.bind_this(&Value::map([("id", Value::from("p1"))]));
        assert_eq!(
            bound.to_string(),
            "post.id == \"p1\" && null == null"
        );
    }

    #[test]
    fn aggregate_detection() {
        assert!(Expression::parse("sum(price) / count()").unwrap().is_aggregate());
        assert!(!Expression::parse("size(tags)").unwrap().is_aggregate());
    }

    #[test]
    fn serde_as_string() {
        let e = Expression::parse("a >= 2").unwrap();
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"a >= 2\"");
        assert_eq!(serde_json::from_str::<Expression>(&json).unwrap(), e);
    }
}
