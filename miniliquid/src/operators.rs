//! Comparison operators used in conditions.
//!
//! Conditions in `if`, `elsif` and `unless` compare two operands with an
//! operator: `{% if product.price > 10 %}`.  The following operators are
//! built in:
//!
//! | Operator | Meaning |
//! |---|---|
//! | `==` | equality, `empty` and `blank` aware |
//! | `!=`, `<>` | inequality |
//! | `<`, `<=`, `>`, `>=` | ordering, always false if either side is `nil` |
//! | `contains` | substring for strings, membership for sequences, key for maps |
//! | `startswith`, `endswith` | prefix or suffix of strings, first or last item of sequences |
//! | `haskey` | the map on the left has the key on the right |
//! | `hasvalue` | the map on the left has the value on the right |
//!
//! Custom operators can be registered with
//! [`Environment::add_operator`](crate::Environment::add_operator), which also
//! allows overriding the built-in ones:
//!
//! ```
//! # use miniliquid::{Environment, context};
//! let mut env = Environment::new();
//! env.add_operator("divisibleby", |a, b| {
//!     match (a.as_i64(), b.as_i64()) {
//!         (Some(a), Some(b)) if b != 0 => a % b == 0,
//!         _ => false,
//!     }
//! });
//! let rv = env.render_str("{% if 10 divisibleby 5 %}yes{% endif %}", context!{}).unwrap();
//! assert_eq!(rv, "yes");
//! ```
//!
//! Operator names are matched under the environment's
//! [`NamingConvention`](crate::NamingConvention).
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::utils::{NamingConvention, SyntaxCompatibility};
use crate::value::ops::{self, compare, loose_eq};
use crate::value::{Value, ValueKind};

pub(crate) type OperatorFunc =
    dyn Fn(&Value, &Value, SyntaxCompatibility) -> bool + Send + Sync + 'static;

/// The table of condition operators.
#[derive(Clone, Default)]
pub(crate) struct OperatorSet {
    operators: BTreeMap<String, Arc<OperatorFunc>>,
}

impl fmt::Debug for OperatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.operators.keys()).finish()
    }
}

impl OperatorSet {
    pub fn insert(&mut self, name: &str, op: Arc<OperatorFunc>) {
        self.operators.insert(name.to_string(), op);
    }

    pub fn remove(&mut self, name: &str) {
        self.operators.remove(name);
    }

    pub fn lookup(&self, name: &str, convention: NamingConvention) -> Option<&Arc<OperatorFunc>> {
        if let Some(rv) = self.operators.get(name) {
            return Some(rv);
        }
        self.operators
            .iter()
            .find(|(key, _)| convention.matches(&convention.registered_name(key), name))
            .map(|x| x.1)
    }
}

/// Applies an operator by name.
pub(crate) fn apply(
    operators: &OperatorSet,
    convention: NamingConvention,
    compat: SyntaxCompatibility,
    op: &str,
    left: &Value,
    right: &Value,
) -> Result<bool, Error> {
    match operators.lookup(op, convention) {
        Some(func) => Ok(func(left, right, compat)),
        None => Err(Error::new(
            ErrorKind::UnknownOperator,
            format!("unknown operator '{op}'"),
        )
        .with_subject(op)),
    }
}

fn ordered(left: &Value, right: &Value, compat: SyntaxCompatibility) -> Option<Ordering> {
    if left.is_nil() || right.is_nil() {
        return None;
    }
    match compare(left, right) {
        Some(rv) => Some(rv),
        None if compat < SyntaxCompatibility::Liquid22 => {
            match (ops::to_number(left), ops::to_number(right)) {
                (Some(a), Some(b)) => compare(&a.into(), &b.into()),
                _ => None,
            }
        }
        None => None,
    }
}

/// The `==` operator.
pub fn eq(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    loose_eq(left, right, compat)
}

/// The `!=` and `<>` operators.
pub fn ne(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    !loose_eq(left, right, compat)
}

/// The `<` operator.
pub fn lt(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    ordered(left, right, compat) == Some(Ordering::Less)
}

/// The `<=` operator.
pub fn lte(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    matches!(
        ordered(left, right, compat),
        Some(Ordering::Less | Ordering::Equal)
    )
}

/// The `>` operator.
pub fn gt(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    ordered(left, right, compat) == Some(Ordering::Greater)
}

/// The `>=` operator.
pub fn gte(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    matches!(
        ordered(left, right, compat),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

/// The `contains` operator.
pub fn contains(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    if right.is_undefined() {
        return false;
    }
    match left.kind() {
        ValueKind::String => match (left.as_str(), right.is_nil()) {
            (Some(s), false) => s.contains(&right.to_string()),
            _ => false,
        },
        ValueKind::Map => left
            .as_map()
            .map_or(false, |m| m.contains_key(&*right.to_string())),
        _ => left
            .try_iter()
            .map_or(false, |items| items.iter().any(|x| loose_eq(x, right, compat))),
    }
}

/// The `startswith` operator.
pub fn startswith(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    match left.as_str() {
        Some(s) => !right.is_nil() && s.starts_with(&right.to_string()),
        None => left
            .get_index(0)
            .map_or(false, |first| loose_eq(&first, right, compat)),
    }
}

/// The `endswith` operator.
pub fn endswith(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    match left.as_str() {
        Some(s) => !right.is_nil() && s.ends_with(&right.to_string()),
        None => left
            .get_index(-1)
            .map_or(false, |last| loose_eq(&last, right, compat)),
    }
}

/// The `haskey` operator.
pub fn haskey(left: &Value, right: &Value, _compat: SyntaxCompatibility) -> bool {
    left.as_map()
        .map_or(false, |m| m.contains_key(&*right.to_string()))
}

/// The `hasvalue` operator.
pub fn hasvalue(left: &Value, right: &Value, compat: SyntaxCompatibility) -> bool {
    left.as_map()
        .map_or(false, |m| m.values().any(|x| loose_eq(x, right, compat)))
}

pub(crate) fn get_builtin_operators() -> OperatorSet {
    let mut rv = OperatorSet::default();
    rv.insert("==", Arc::new(eq));
    rv.insert("!=", Arc::new(ne));
    rv.insert("<>", Arc::new(ne));
    rv.insert("<", Arc::new(lt));
    rv.insert("<=", Arc::new(lte));
    rv.insert(">", Arc::new(gt));
    rv.insert(">=", Arc::new(gte));
    rv.insert("contains", Arc::new(contains));
    rv.insert("startswith", Arc::new(startswith));
    rv.insert("endswith", Arc::new(endswith));
    rv.insert("haskey", Arc::new(haskey));
    rv.insert("hasvalue", Arc::new(hasvalue));
    rv
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPAT: SyntaxCompatibility = SyntaxCompatibility::Liquid20;

    #[test]
    fn test_nil_ordering_is_false() {
        for op in [lt, lte, gt, gte] {
            assert!(!op(&Value::NIL, &Value::from(1), COMPAT));
            assert!(!op(&Value::from(1), &Value::UNDEFINED, COMPAT));
        }
        assert!(lt(&Value::from(1), &Value::from(2.5), COMPAT));
        assert!(gte(&Value::from("b"), &Value::from("a"), COMPAT));
    }

    #[test]
    fn test_numeric_strings() {
        assert!(lt(&Value::from("9"), &Value::from(10), COMPAT));
        assert!(!lt(
            &Value::from("9"),
            &Value::from(10),
            SyntaxCompatibility::Liquid22
        ));
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("hello"), &Value::from("ell"), COMPAT));
        assert!(!contains(&Value::from("hello"), &Value::NIL, COMPAT));
        assert!(contains(&Value::from(vec![1, 2]), &Value::from(2), COMPAT));
        assert!(contains(&Value::from_range(1, 5), &Value::from(5), COMPAT));
        let map: Value = [("a", 1)].into_iter().collect();
        assert!(contains(&map, &Value::from("a"), COMPAT));
        assert!(haskey(&map, &Value::from("a"), COMPAT));
        assert!(hasvalue(&map, &Value::from(1), COMPAT));
        assert!(!hasvalue(&map, &Value::from(2), COMPAT));
    }

    #[test]
    fn test_affixes() {
        assert!(startswith(&Value::from("hello"), &Value::from("he"), COMPAT));
        assert!(endswith(&Value::from("hello"), &Value::from("lo"), COMPAT));
        let seq = Value::from(vec!["a", "b"]);
        assert!(startswith(&seq, &Value::from("a"), COMPAT));
        assert!(endswith(&seq, &Value::from("b"), COMPAT));
        assert!(!endswith(&seq, &Value::from("a"), COMPAT));
    }

    #[test]
    fn test_unknown_operator() {
        let ops = get_builtin_operators();
        let err = apply(
            &ops,
            NamingConvention::Ruby,
            COMPAT,
            "=~",
            &Value::NIL,
            &Value::NIL,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperator);
        assert!(err.to_string().contains("=~"));
    }
}
