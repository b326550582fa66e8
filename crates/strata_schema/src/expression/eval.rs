//! Expression evaluation.

use super::{BinaryOp, Expression, AGGREGATES};
use crate::error::{SchemaError, SchemaResult};
use crate::name::Name;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strata_codec::{compare, equals, Value};

/// Values visible to an expression.
///
/// Paths are resolved against named variables first (`this`, `source`)
/// and then against the root value. Paths that traverse an array are
/// projected over its elements.
#[derive(Debug, Clone, Default)]
pub struct Context<'a> {
    root: Option<&'a Value>,
    vars: BTreeMap<&'a str, &'a Value>,
}

impl<'a> Context<'a> {
    /// A context whose unqualified paths resolve into `root`.
    pub fn new(root: &'a Value) -> Self {
        Self {
            root: Some(root),
            vars: BTreeMap::new(),
        }
    }

    /// Adds a named variable.
    #[must_use]
    pub fn with(mut self, name: &'a str, value: &'a Value) -> Self {
        self.vars.insert(name, value);
        self
    }

    /// Resolves a path; unresolved paths are `null`.
    pub fn lookup(&self, name: &Name) -> Value {
        let parts = name.parts();
        if let Some((first, rest)) = parts.split_first() {
            if let Some(var) = self.vars.get(first.as_str()) {
                return resolve(var, rest);
            }
        }
        self.root.map_or(Value::Null, |root| resolve(root, parts))
    }
}

pub(crate) fn resolve(value: &Value, parts: &[String]) -> Value {
    match parts.split_first() {
        None => value.clone(),
        Some((head, rest)) => match value {
            Value::Map(map) => map.get(head).map_or(Value::Null, |v| resolve(v, rest)),
            Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, parts)).collect()),
            _ => Value::Null,
        },
    }
}

fn type_error(what: &str, value: &Value) -> SchemaError {
    SchemaError::expression(format!("{what} not defined for {}", value.type_name()))
}

impl Expression {
    /// Evaluates this expression.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Expression`] on type errors, overflow,
    /// division by zero or unknown functions.
    pub fn evaluate(&self, ctx: &Context<'_>) -> SchemaResult<Value> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Path(name) => Ok(ctx.lookup(name)),
            Self::Array(items) => items
                .iter()
                .map(|e| e.evaluate(ctx))
                .collect::<SchemaResult<Vec<_>>>()
                .map(Value::Array),
            Self::Not(e) => match e.evaluate(ctx)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("!", &other)),
            },
            Self::Negate(e) => match e.evaluate(ctx)? {
                Value::Integer(n) => n
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| SchemaError::expression("integer overflow")),
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("-", &other)),
            },
            Self::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                if !truthy(&left.evaluate(ctx)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&right.evaluate(ctx)?)?))
            }
            Self::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                if truthy(&left.evaluate(ctx)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&right.evaluate(ctx)?)?))
            }
            Self::Binary { op, left, right } => {
                apply(*op, &left.evaluate(ctx)?, &right.evaluate(ctx)?)
            }
            Self::In { value, list } => {
                let value = value.evaluate(ctx)?;
                match list.evaluate(ctx)? {
                    Value::Array(items) => {
                        Ok(Value::Bool(items.iter().any(|item| equals(&value, item))))
                    }
                    Value::Null => Ok(Value::Bool(false)),
                    other => Err(type_error("in", &other)),
                }
            }
            Self::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|e| e.evaluate(ctx))
                    .collect::<SchemaResult<Vec<_>>>()?;
                call(name, args)
            }
        }
    }

    /// Evaluates this expression as a predicate. `null` is false.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails or the result is not a boolean.
    pub fn matches(&self, ctx: &Context<'_>) -> SchemaResult<bool> {
        truthy(&self.evaluate(ctx)?)
    }

    /// Evaluates this expression over a group of rows.
    ///
    /// Aggregate calls fold their argument across all rows; everything
    /// else is evaluated against the first row.
    ///
    /// # Errors
    ///
    /// Returns an error if any row fails to evaluate.
    pub fn evaluate_aggregate(&self, rows: &[Context<'_>]) -> SchemaResult<Value> {
        let folded = self.fold_aggregates(rows)?;
        match rows.first() {
            Some(first) => folded.evaluate(first),
            None => folded.evaluate(&Context::default()),
        }
    }

    fn fold_aggregates(&self, rows: &[Context<'_>]) -> SchemaResult<Expression> {
        Ok(match self {
            Self::Call { name, args } if AGGREGATES.contains(&name.as_str()) => {
                let values = match args.as_slice() {
                    [] if name == "count" => {
                        let count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
                        return Ok(Self::Constant(Value::Integer(count)));
                    }
                    [arg] => rows
                        .iter()
                        .map(|row| arg.evaluate(row))
                        .collect::<SchemaResult<Vec<_>>>()?,
                    _ => {
                        return Err(SchemaError::expression(format!(
                            "{name} takes one argument"
                        )))
                    }
                };
                Self::Constant(aggregate(name, values)?)
            }
            Self::Constant(_) | Self::Path(_) => self.clone(),
            Self::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|e| e.fold_aggregates(rows))
                    .collect::<SchemaResult<_>>()?,
            ),
            Self::Not(e) => Self::Not(Box::new(e.fold_aggregates(rows)?)),
            Self::Negate(e) => Self::Negate(Box::new(e.fold_aggregates(rows)?)),
            Self::Binary { op, left, right } => Self::Binary {
                op: *op,
                left: Box::new(left.fold_aggregates(rows)?),
                right: Box::new(right.fold_aggregates(rows)?),
            },
            Self::In { value, list } => Self::In {
                value: Box::new(value.fold_aggregates(rows)?),
                list: Box::new(list.fold_aggregates(rows)?),
            },
            Self::Call { name, args } => Self::Call {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|e| e.fold_aggregates(rows))
                    .collect::<SchemaResult<_>>()?,
            },
        })
    }
}

fn truthy(value: &Value) -> SchemaResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(SchemaError::expression(format!(
            "expected boolean, got {}",
            other.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn apply(op: BinaryOp, left: &Value, right: &Value) -> SchemaResult<Value> {
    let ordering = |accept: fn(Ordering) -> bool| -> SchemaResult<Value> {
        if left.is_null() || right.is_null() {
            return Ok(Value::Bool(false));
        }
        let ord = compare(left, right).map_err(|e| SchemaError::expression(e.to_string()))?;
        Ok(Value::Bool(accept(ord)))
    };
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(left, right))),
        BinaryOp::Lt => ordering(Ordering::is_lt),
        BinaryOp::Le => ordering(Ordering::is_le),
        BinaryOp::Gt => ordering(Ordering::is_gt),
        BinaryOp::Ge => ordering(Ordering::is_ge),
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(truthy(left)? && truthy(right)?)),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        _ => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => integer_op(op, *a, *b),
            (Value::Integer(a), Value::Number(b)) => number_op(op, *a as f64, *b),
            (Value::Number(a), Value::Integer(b)) => number_op(op, *a, *b as f64),
            (Value::Number(a), Value::Number(b)) => number_op(op, *a, *b),
            (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
                Ok(Value::String(format!("{a}{b}")))
            }
            _ => Err(SchemaError::expression(format!(
                "cannot apply {op:?} to {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> SchemaResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => {
            return Err(SchemaError::expression("division by zero"))
        }
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
        _ => None,
    };
    result
        .map(Value::Integer)
        .ok_or_else(|| SchemaError::expression("integer overflow"))
}

fn number_op(op: BinaryOp, a: f64, b: f64) -> SchemaResult<Value> {
    Ok(Value::Number(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => return Err(SchemaError::expression(format!("{op:?} is not arithmetic"))),
    }))
}

fn arity(name: &str, args: &[Value], expected: usize) -> SchemaResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(SchemaError::expression(format!(
            "{name} takes {expected} argument(s), got {}",
            args.len()
        )))
    }
}

fn call(name: &str, mut args: Vec<Value>) -> SchemaResult<Value> {
    match name {
        "size" => {
            arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Binary(b) => b.len(),
                Value::Array(items) => items.len(),
                Value::Map(map) => map.len(),
                Value::Null => return Ok(Value::Null),
                other => return Err(type_error("size", other)),
            };
            Ok(Value::Integer(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        "lower" | "upper" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::String(s) if name == "lower" => Ok(Value::String(s.to_lowercase())),
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                Value::Null => Ok(Value::Null),
                other => Err(type_error(name, other)),
            }
        }
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or_default()),
        _ if AGGREGATES.contains(&name) => {
            // Outside a view, aggregates fold an array argument.
            arity(name, &args, 1)?;
            match args.swap_remove(0) {
                Value::Array(items) => aggregate(name, items),
                Value::Null => aggregate(name, Vec::new()),
                other => Err(type_error(name, &other)),
            }
        }
        _ => Err(SchemaError::expression(format!("unknown function {name}"))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(name: &str, values: Vec<Value>) -> SchemaResult<Value> {
    let present: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    let count = i64::try_from(present.len()).unwrap_or(i64::MAX);
    match name {
        "count" => Ok(Value::Integer(count)),
        "sum" => present
            .iter()
            .try_fold(Value::Integer(0), |acc, v| apply(BinaryOp::Add, &acc, v)),
        "avg" => {
            if present.is_empty() {
                return Ok(Value::Null);
            }
            let sum = aggregate("sum", present)?;
            let sum = sum
                .as_number()
                .ok_or_else(|| type_error("avg", &sum))?;
            Ok(Value::Number(sum / count as f64))
        }
        "min" | "max" => {
            let mut best: Option<Value> = None;
            for value in present {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let ord = compare(&value, &current)
                            .map_err(|e| SchemaError::expression(e.to_string()))?;
                        let replace = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                        if replace {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.unwrap_or_default())
        }
        _ => Err(SchemaError::expression(format!("unknown aggregate {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, root: &Value) -> SchemaResult<Value> {
        Expression::parse(text)?.evaluate(&Context::new(root))
    }

    fn post() -> Value {
        Value::map([
            ("title", Value::from("Hello")),
            ("score", Value::Integer(7)),
            ("ratio", Value::Number(0.5)),
            (
                "tags",
                Value::Array(vec![Value::from("a"), Value::from("b")]),
            ),
            (
                "comments",
                Value::Array(vec![
                    Value::map([("likes", Value::Integer(2))]),
                    Value::map([("likes", Value::Integer(5))]),
                ]),
            ),
            ("author", Value::map([("id", Value::from("u1"))])),
        ])
    }

    #[test]
    fn arithmetic_and_comparison() {
        let p = post();
        assert_eq!(eval("score * 2 + 1", &p).unwrap(), Value::Integer(15));
        assert_eq!(eval("score / 2", &p).unwrap(), Value::Integer(3));
        assert_eq!(eval("score + ratio", &p).unwrap(), Value::Number(7.5));
        assert_eq!(eval("score >= 7 && ratio < 1", &p).unwrap(), Value::Bool(true));
        assert_eq!(eval("title + \"!\"", &p).unwrap(), Value::from("Hello!"));
        assert_eq!(eval("missing + 1", &p).unwrap(), Value::Null);
    }

    #[test]
    fn errors() {
        let p = post();
        assert!(eval("score / 0", &p).is_err());
        assert!(eval("title > 3", &p).is_err());
        assert!(eval("title && true", &p).is_err());
        assert!(eval("nope(1)", &p).is_err());
    }

    #[test]
    fn null_ordering_is_false() {
        let p = post();
        assert_eq!(eval("missing < 3", &p).unwrap(), Value::Bool(false));
        assert_eq!(eval("missing == null", &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn functions_and_membership() {
        let p = post();
        assert_eq!(eval("size(tags)", &p).unwrap(), Value::Integer(2));
        assert_eq!(eval("lower(title)", &p).unwrap(), Value::from("hello"));
        assert_eq!(eval("coalesce(missing, title)", &p).unwrap(), Value::from("Hello"));
        assert_eq!(eval("\"b\" in tags", &p).unwrap(), Value::Bool(true));
        assert_eq!(eval("score in [1, 7.0]", &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn paths_project_over_arrays() {
        let p = post();
        assert_eq!(
            eval("comments.likes", &p).unwrap(),
            Value::Array(vec![Value::Integer(2), Value::Integer(5)])
        );
        assert_eq!(eval("sum(comments.likes)", &p).unwrap(), Value::Integer(7));
        assert_eq!(eval("max(comments.likes)", &p).unwrap(), Value::Integer(5));
        assert_eq!(eval("avg(comments.likes)", &p).unwrap(), Value::Number(3.5));
    }

    #[test]
    fn variables_shadow_root() {
        let p = post();
        let owner = Value::map([("id", Value::from("u1"))]);
        let ctx = Context::new(&p).with("this", &owner);
        let e = Expression::parse("author.id == this.id").unwrap();
        assert!(e.matches(&ctx).unwrap());
    }

    #[test]
    fn aggregate_over_rows() {
        let rows = [
            Value::map([("author", Value::from("u1")), ("score", Value::Integer(3))]),
            Value::map([("author", Value::from("u1")), ("score", Value::Integer(5))]),
            Value::map([("author", Value::from("u1")), ("score", Value::Null)]),
        ];
        let contexts: Vec<Context<'_>> = rows.iter().map(Context::new).collect();
        let eval = |text: &str| {
            Expression::parse(text)
                .unwrap()
                .evaluate_aggregate(&contexts)
                .unwrap()
        };
        assert_eq!(eval("count()"), Value::Integer(3));
        assert_eq!(eval("count(score)"), Value::Integer(2));
        assert_eq!(eval("sum(score) * 10"), Value::Integer(80));
        assert_eq!(eval("min(score)"), Value::Integer(3));
        assert_eq!(eval("author"), Value::from("u1"));
    }
}
