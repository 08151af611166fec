//! Expressions evaluated by bind and filter clauses.
//!
//! A small, side-effect-free language over [`Value`]s: literals, variable
//! references, map field access, comparisons, boolean connectives,
//! arithmetic, string concatenation, coalescing, and nil tests.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use cadence_foundation::{Error, Fields, Result, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOp {
    /// Equality (numbers compare across int and float).
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
}

/// An expression over binding variables.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A binding variable.
    Var(String),
    /// Field access on a map; nil when the field or the map is absent.
    Get(Box<Expr>, String),
    /// A binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Boolean negation by truthiness.
    Not(Box<Expr>),
    /// True if the operand is nil.
    IsNil(Box<Expr>),
    /// String concatenation of the operands' display forms; nil renders empty.
    Concat(Vec<Expr>),
    /// The first non-nil operand, or nil.
    Coalesce(Vec<Expr>),
}

impl Expr {
    /// A literal.
    #[must_use]
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Field access on this expression.
    #[must_use]
    pub fn field(self, key: impl Into<String>) -> Self {
        Self::Get(Box::new(self), key.into())
    }

    /// A binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// `lhs == rhs`.
    #[must_use]
    pub fn equals(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    /// Negation.
    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Nil test.
    #[must_use]
    pub fn is_nil(inner: Self) -> Self {
        Self::IsNil(Box::new(inner))
    }

    /// Returns every variable this expression reads, sorted.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables<'a>(&'a self, vars: &mut BTreeSet<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Var(name) => {
                vars.insert(name.as_str());
            }
            Self::Get(base, _) | Self::Not(base) | Self::IsNil(base) => {
                base.collect_variables(vars);
            }
            Self::Binary(_, lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
            Self::Concat(items) | Self::Coalesce(items) => {
                for item in items {
                    item.collect_variables(vars);
                }
            }
        }
    }

    /// Evaluates against a set of variable values.
    ///
    /// # Errors
    /// Returns an error on unbound variables, type mismatches, or
    /// arithmetic overflow.
    pub fn eval(&self, vars: &Fields) -> Result<Value> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Var(name) => vars
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| Error::unbound_variable(name.clone())),
            Self::Get(base, key) => match base.eval(vars)? {
                Value::Map(m) => Ok(m.get(key.as_str()).cloned().unwrap_or(Value::Nil)),
                Value::Nil => Ok(Value::Nil),
                other => Err(Error::type_mismatch("map", other.type_name())),
            },
            Self::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, vars),
            Self::Not(inner) => Ok(Value::Bool(!inner.eval(vars)?.is_truthy())),
            Self::IsNil(inner) => Ok(Value::Bool(inner.eval(vars)?.is_nil())),
            Self::Concat(items) => {
                let mut out = String::new();
                for item in items {
                    match item.eval(vars)? {
                        Value::Nil => {}
                        v => out.push_str(&v.to_string()),
                    }
                }
                Ok(Value::from(out))
            }
            Self::Coalesce(items) => {
                for item in items {
                    let v = item.eval(vars)?;
                    if !v.is_nil() {
                        return Ok(v);
                    }
                }
                Ok(Value::Nil)
            }
        }
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, vars: &Fields) -> Result<Value> {
    // Connectives short-circuit before the right side is evaluated.
    match op {
        BinaryOp::And => {
            if !lhs.eval(vars)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(rhs.eval(vars)?.is_truthy()));
        }
        BinaryOp::Or => {
            if lhs.eval(vars)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(rhs.eval(vars)?.is_truthy()));
        }
        _ => {}
    }

    let a = lhs.eval(vars)?;
    let b = rhs.eval(vars)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&a, &b))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&a, &b))),
        BinaryOp::Lt => compare(&a, &b).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => compare(&a, &b).map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => compare(&a, &b).map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => compare(&a, &b).map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::Add => arithmetic(op, &a, &b, i64::checked_add, |x, y| x + y),
        BinaryOp::Sub => arithmetic(op, &a, &b, i64::checked_sub, |x, y| x - y),
        BinaryOp::Mul => arithmetic(op, &a, &b, i64::checked_mul, |x, y| x * y),
        BinaryOp::And | BinaryOp::Or => Err(Error::internal("connective not short-circuited")),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            a.partial_cmp(b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    a.partial_cmp(b).ok_or_else(|| {
        Error::type_mismatch(
            "comparable values",
            format!("{} and {}", a.type_name(), b.type_name()),
        )
    })
}

fn arithmetic(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(*x, *y)
            .map(Value::Int)
            .ok_or_else(|| Error::evaluation(format!("integer overflow in {op:?}"))),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(Error::type_mismatch(
                "numbers",
                format!("{} and {}", a.type_name(), b.type_name()),
            )),
        },
    }
}
