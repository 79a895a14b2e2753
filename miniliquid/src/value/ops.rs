use std::cmp::Ordering;

use crate::error::{Error, ErrorKind};
use crate::utils::SyntaxCompatibility;
use crate::value::{Value, ValueRepr};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(x) => x as f64,
            Number::Float(x) => x,
        }
    }
}

impl From<Number> for Value {
    fn from(val: Number) -> Value {
        match val {
            Number::Int(x) => Value::from(x),
            Number::Float(x) => Value::from(x),
        }
    }
}

/// Parses a numeric string the way templates coerce strings to numbers.
pub fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(val) = s.parse::<i64>() {
        Some(Number::Int(val))
    } else if s.bytes().all(|c| c.is_ascii_digit() || matches!(c, b'.' | b'-' | b'+')) {
        s.parse::<f64>().ok().map(Number::Float)
    } else {
        None
    }
}

/// Returns the numeric value of a value without coercing strings.
pub fn as_number(value: &Value) -> Option<Number> {
    match value.0 {
        ValueRepr::I64(x) => Some(Number::Int(x)),
        ValueRepr::F64(x) => Some(Number::Float(x)),
        _ => None,
    }
}

/// Returns the numeric value of a value, coercing numeric strings.
pub fn to_number(value: &Value) -> Option<Number> {
    match value.0 {
        ValueRepr::String(ref s) => parse_number(s),
        ValueRepr::Undefined | ValueRepr::Nil => Some(Number::Int(0)),
        _ => as_number(value),
    }
}

fn numbers_eq(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a == b,
        (a, b) => a.as_f64() == b.as_f64(),
    }
}

/// Structural equality without keyword or coercion rules.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (&a.0, &b.0) {
        (ValueRepr::Undefined | ValueRepr::Nil, ValueRepr::Undefined | ValueRepr::Nil) => true,
        (ValueRepr::Empty, ValueRepr::Empty) | (ValueRepr::Blank, ValueRepr::Blank) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| strict_eq(a, b))
        }
        (ValueRepr::Map(a), ValueRepr::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map_or(false, |other| strict_eq(v, other)))
        }
        (ValueRepr::Range(a1, a2), ValueRepr::Range(b1, b2)) => a1 == b1 && a2 == b2,
        #[cfg(feature = "datetime")]
        (ValueRepr::DateTime(a), ValueRepr::DateTime(b)) => a == b,
        (ValueRepr::Object(a), ValueRepr::Object(b)) => std::sync::Arc::ptr_eq(a, b),
        _ => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => numbers_eq(a, b),
            _ => false,
        },
    }
}

/// Equality as used by the `==` operator and `case`/`when`.
///
/// Handles the `empty` and `blank` keywords and, below
/// [`SyntaxCompatibility::Liquid22`], compares numbers with numeric strings.
pub fn loose_eq(a: &Value, b: &Value, compat: SyntaxCompatibility) -> bool {
    match (&a.0, &b.0) {
        (ValueRepr::Empty, _) => b.is_empty(),
        (_, ValueRepr::Empty) => a.is_empty(),
        (ValueRepr::Blank, _) => b.is_blank(),
        (_, ValueRepr::Blank) => a.is_blank(),
        (ValueRepr::String(s), ValueRepr::I64(_) | ValueRepr::F64(_))
        | (ValueRepr::I64(_) | ValueRepr::F64(_), ValueRepr::String(s))
            if compat < SyntaxCompatibility::Liquid22 =>
        {
            let num = as_number(a).or_else(|| as_number(b));
            match (parse_number(s), num) {
                (Some(a), Some(b)) => numbers_eq(a, b),
                _ => false,
            }
        }
        _ => strict_eq(a, b),
    }
}

/// Orders two values if they are comparable.
///
/// `nil` is never comparable.  Numbers compare with numbers, strings with
/// strings and points in time with each other.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (&a.0, &b.0) {
        (ValueRepr::String(a), ValueRepr::String(b)) => Some(a.cmp(b)),
        #[cfg(feature = "datetime")]
        (ValueRepr::DateTime(a), ValueRepr::DateTime(b)) => Some(a.cmp(b)),
        _ => match (as_number(a), as_number(b)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    }
}

/// Total ordering used for sorting.  Incomparable values sort last.
pub fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match compare(a, b) {
        Some(rv) => rv,
        None => match (a.is_nil(), b.is_nil()) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        },
    }
}

fn invalid_number(op: &str, value: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("unable to {op} {:?}, not a number", value.to_string()),
    )
}

fn number_arg(op: &str, value: &Value) -> Result<Number, Error> {
    to_number(value).ok_or_else(|| invalid_number(op, value))
}

macro_rules! math_op {
    ($name:ident, $op:literal, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            let a = ok!(number_arg($op, lhs));
            let b = ok!(number_arg($op, rhs));
            match (a, b) {
                (Number::Int(a), Number::Int(b)) => match a.$int(b) {
                    Some(rv) => Ok(Value::from(rv)),
                    None => Ok(Value::from(a as f64 $float b as f64)),
                },
                (a, b) => Ok(Value::from(a.as_f64() $float b.as_f64())),
            }
        }
    };
}

math_op!(add, "add", checked_add, +);
math_op!(sub, "subtract", checked_sub, -);
math_op!(mul, "multiply", checked_mul, *);

/// Integer division rounding towards negative infinity.
///
/// Returns `None` if the quotient does not fit.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = some!(a.checked_div(b));
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Integer remainder taking the sign of the divisor.
fn floor_rem(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let a = ok!(number_arg("divide", lhs));
    let b = ok!(number_arg("divide", rhs));
    match (a, b) {
        (_, Number::Int(0)) => Err(Error::new(ErrorKind::InvalidOperation, "divided by 0")),
        (Number::Int(a), Number::Int(b)) => match floor_div(a, b) {
            Some(rv) => Ok(Value::from(rv)),
            None => Ok(Value::from((a as f64 / b as f64).floor())),
        },
        (a, b) => Ok(Value::from(a.as_f64() / b.as_f64())),
    }
}

pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let a = ok!(number_arg("modulo", lhs));
    let b = ok!(number_arg("modulo", rhs));
    match (a, b) {
        (_, Number::Int(0)) => Err(Error::new(ErrorKind::InvalidOperation, "divided by 0")),
        (Number::Int(a), Number::Int(b)) => Ok(Value::from(floor_rem(a, b))),
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            Ok(Value::from(a - b * (a / b).floor()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_eq_compat() {
        let num = Value::from(1);
        let s = Value::from("1");
        assert!(loose_eq(&num, &s, SyntaxCompatibility::Liquid20));
        assert!(loose_eq(&s, &num, SyntaxCompatibility::Liquid21));
        assert!(!loose_eq(&num, &s, SyntaxCompatibility::Liquid22));
        assert!(loose_eq(&Value::from(1), &Value::from(1.0), SyntaxCompatibility::Liquid22));
    }

    #[test]
    fn test_nil_never_orders() {
        assert_eq!(compare(&Value::NIL, &Value::from(1)), None);
        assert_eq!(compare(&Value::from(1), &Value::UNDEFINED), None);
        assert_eq!(compare(&Value::from(1), &Value::from(2.5)), Some(Ordering::Less));
    }

    #[test]
    fn test_math() {
        assert_eq!(add(&Value::from(1), &Value::from("2")).unwrap(), Value::from(3));
        assert_eq!(div(&Value::from(7), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(div(&Value::from(7.0), &Value::from(2)).unwrap(), Value::from(3.5));
        assert_eq!(rem(&Value::from(-1), &Value::from(3)).unwrap(), Value::from(2));
        assert_eq!(rem(&Value::from(7), &Value::from(-3)).unwrap(), Value::from(-2));
        assert_eq!(rem(&Value::from(i64::MIN), &Value::from(-1)).unwrap(), Value::from(0));
        assert_eq!(
            div(&Value::from(i64::MIN), &Value::from(-1)).unwrap(),
            Value::from(-(i64::MIN as f64))
        );
        assert!(div(&Value::from(1), &Value::from(0)).is_err());
        assert!(sub(&Value::from("x"), &Value::from(1)).is_err());
    }
}
