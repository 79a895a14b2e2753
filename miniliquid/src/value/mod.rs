//! Provides a dynamic value type abstraction.
//!
//! This module gives access to the dynamically typed [`Value`] which is what
//! variables, filter arguments and filter results are made of while a
//! template renders.
//!
//! # Basic Value Conversions
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use miniliquid::value::Value;
//! let int_value = Value::from(42);
//! let nil_value = Value::from(());
//! let true_value = Value::from(true);
//! let seq_value: Value = (1..4).collect();
//! ```
//!
//! # Serde Conversions
//!
//! Host data is usually handed to the engine through [`serde::Serialize`].
//! [`Value::from_serialize`] performs that conversion and it is also what
//! [`Template::render`](crate::Template::render) and the
//! [`context!`](crate::context) macro use.  Values passed through serde
//! survive the conversion unchanged, so objects can be embedded into
//! serializable structures.
//!
//! # Late Bound Objects
//!
//! Values can hold objects implementing [`Object`].  Objects compute their
//! members on demand and get access to the active
//! [`Context`](crate::Context) when doing so.  The `forloop` variable is
//! such an object.
//!
//! ```
//! # use miniliquid::value::{Object, Value};
//! # use miniliquid::Context;
//! #[derive(Debug)]
//! struct Clock;
//!
//! impl Object for Clock {
//!     fn get_member(&self, name: &str, _ctx: &Context) -> Option<Value> {
//!         match name {
//!             "hour" => Some(Value::from(12)),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let value = Value::from_object(Clock);
//! ```
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::Error;

pub use crate::value::argtypes::{from_args, ArgKind, ArgType, FunctionArgs, FunctionResult, Rest};
pub use crate::value::object::Object;
pub(crate) use crate::value::serialize::serializing_for_value;

mod argtypes;
mod object;
pub(crate) mod ops;
mod serialize;

/// The map type used by map values.
///
/// Maps keep their insertion order.
pub type ValueMap = indexmap::IndexMap<Arc<str>, Value>;

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ValueKind {
    /// The value is undefined (a lookup missed).
    Undefined,
    /// The value is `nil`.
    Nil,
    /// The value is a [`bool`].
    Bool,
    /// The value is a number.
    Number,
    /// The value is a string.
    String,
    /// The value is a sequence (this includes ranges).
    Seq,
    /// The value is a key/value mapping.
    Map,
    /// The value is a point in time.
    DateTime,
    /// The value is a late bound object.
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::DateTime => "datetime",
            ValueKind::Object => "object",
        })
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined,
    Nil,
    Empty,
    Blank,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Range(i64, i64),
    #[cfg(feature = "datetime")]
    DateTime(time::OffsetDateTime),
    Object(Arc<dyn Object>),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::Undefined => f.write_str("undefined"),
            ValueRepr::Nil => f.write_str("nil"),
            ValueRepr::Empty => f.write_str("empty"),
            ValueRepr::Blank => f.write_str("blank"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::String(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Range(start, end) => write!(f, "({start}..{end})"),
            #[cfg(feature = "datetime")]
            ValueRepr::DateTime(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Object(val) => fmt::Debug::fmt(val, f),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::strict_eq(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Formats a float the way templates print them.
///
/// Integral floats keep a trailing `.0`.
pub(crate) fn format_f64(f: &mut fmt::Formatter<'_>, val: f64) -> fmt::Result {
    if val.is_nan() {
        f.write_str("NaN")
    } else if val.is_infinite() {
        write!(f, "{}Infinity", if val.is_sign_negative() { "-" } else { "" })
    } else {
        let mut num = val.to_string();
        if !num.contains('.') {
            num.push_str(".0");
        }
        f.write_str(&num)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Undefined | ValueRepr::Nil | ValueRepr::Empty | ValueRepr::Blank => Ok(()),
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::I64(val) => val.fmt(f),
            ValueRepr::F64(val) => format_f64(f, *val),
            ValueRepr::String(val) => f.write_str(val),
            ValueRepr::Seq(val) => {
                for item in val.iter() {
                    ok!(fmt::Display::fmt(item, f));
                }
                Ok(())
            }
            ValueRepr::Map(val) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in val.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{key:?}=>"));
                    ok!(match value.0 {
                        ValueRepr::String(ref s) => write!(f, "{s:?}"),
                        ValueRepr::Undefined | ValueRepr::Nil => f.write_str("nil"),
                        _ => fmt::Display::fmt(value, f),
                    });
                }
                f.write_str("}")
            }
            ValueRepr::Range(start, end) => write!(f, "{start}..{end}"),
            #[cfg(feature = "datetime")]
            ValueRepr::DateTime(val) => {
                let (h, m, _) = val.offset().as_hms();
                write!(
                    f,
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02} {}{:02}{:02}",
                    val.year(),
                    val.month() as u8,
                    val.day(),
                    val.hour(),
                    val.minute(),
                    val.second(),
                    if h < 0 || m < 0 { '-' } else { '+' },
                    h.unsigned_abs(),
                    m.unsigned_abs()
                )
            }
            ValueRepr::Object(x) => x.render(f),
        }
    }
}

impl Default for Value {
    fn default() -> Value {
        Value(ValueRepr::Undefined)
    }
}

#[allow(clippy::len_without_is_empty)]
impl Value {
    /// The undefined value.
    ///
    /// This is what a lookup that misses produces.  It renders as an empty
    /// string and is falsy.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined);

    /// The `nil` value.
    pub const NIL: Value = Value(ValueRepr::Nil);

    pub(crate) const EMPTY: Value = Value(ValueRepr::Empty);
    pub(crate) const BLANK: Value = Value(ValueRepr::Blank);

    /// Creates a value from something that can be serialized.
    ///
    /// Conversion failures produce an undefined value.  Use
    /// [`try_from_serialize`](Self::try_from_serialize) to observe them.
    ///
    /// ```
    /// # use miniliquid::value::Value;
    /// let val = Value::from_serialize(&vec![1, 2, 3]);
    /// assert_eq!(val.len(), Some(3));
    /// ```
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Value {
        match Value::try_from_serialize(value) {
            Ok(rv) => rv,
            Err(err) => {
                log::debug!("value conversion failed: {err}");
                Value::UNDEFINED
            }
        }
    }

    /// Like [`from_serialize`](Self::from_serialize) but fails on errors.
    pub fn try_from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
        serialize::transform(value)
    }

    /// Creates a value from a late bound object.
    pub fn from_object<T: Object + 'static>(value: T) -> Value {
        Value(ValueRepr::Object(Arc::new(value)))
    }

    /// Like [`from_object`](Self::from_object) but for shared objects.
    pub fn from_dyn_object(value: Arc<dyn Object>) -> Value {
        Value(ValueRepr::Object(value))
    }

    /// Creates an inclusive integer range.
    pub fn from_range(start: i64, end: i64) -> Value {
        Value(ValueRepr::Range(start, end))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined => ValueKind::Undefined,
            ValueRepr::Nil | ValueRepr::Empty | ValueRepr::Blank => ValueKind::Nil,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) | ValueRepr::Range(..) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
            #[cfg(feature = "datetime")]
            ValueRepr::DateTime(_) => ValueKind::DateTime,
            ValueRepr::Object(_) => ValueKind::Object,
        }
    }

    /// Is this value undefined?
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined)
    }

    /// Is this value `nil` or undefined?
    pub fn is_nil(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined | ValueRepr::Nil)
    }

    /// Checks if the value is truthy.
    ///
    /// Only `nil`, `false` and undefined values are falsy.  Empty strings
    /// and empty sequences are truthy.
    pub fn is_truthy(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::Nil | ValueRepr::Empty | ValueRepr::Blank => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::Object(ref obj) => obj.is_truthy(),
            _ => true,
        }
    }

    /// Checks if the value equals the `empty` keyword.
    pub fn is_empty(&self) -> bool {
        match self.0 {
            ValueRepr::String(ref s) => s.is_empty(),
            ValueRepr::Seq(ref s) => s.is_empty(),
            ValueRepr::Map(ref m) => m.is_empty(),
            ValueRepr::Range(start, end) => end < start,
            ValueRepr::Empty => true,
            ValueRepr::Object(ref obj) => obj.size() == Some(0),
            _ => false,
        }
    }

    /// Checks if the value equals the `blank` keyword.
    pub fn is_blank(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::Nil | ValueRepr::Blank | ValueRepr::Empty => true,
            ValueRepr::Bool(val) => !val,
            ValueRepr::String(ref s) => s.trim().is_empty(),
            _ => self.is_empty(),
        }
    }

    /// If the value is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer (or an integral float), returns it.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            ValueRepr::F64(val) if val.fract() == 0.0 && val.abs() < i64::MAX as f64 => {
                Some(val as i64)
            }
            _ => None,
        }
    }

    /// If the value is a number, returns it as float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a boolean, returns it.
    pub fn as_bool(&self) -> Option<bool> {
        match self.0 {
            ValueRepr::Bool(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a sequence, returns the items.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::Seq(ref val) => Some(&val[..]),
            _ => None,
        }
    }

    /// If the value is a map, returns it.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref val) => Some(val),
            _ => None,
        }
    }

    /// If the value is an object, returns it.
    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self.0 {
            ValueRepr::Object(ref val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a point in time, returns it.
    #[cfg(feature = "datetime")]
    pub fn as_datetime(&self) -> Option<time::OffsetDateTime> {
        match self.0 {
            ValueRepr::DateTime(val) => Some(val),
            _ => None,
        }
    }

    /// Returns the structural size of the value.
    ///
    /// Strings report their length in characters.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::Seq(ref s) => Some(s.len()),
            ValueRepr::Map(ref m) => Some(m.len()),
            ValueRepr::Range(start, end) => Some(range_len(start, end)),
            ValueRepr::Object(ref obj) => obj.size(),
            _ => None,
        }
    }

    /// Converts the value into a list of items if it can be iterated.
    ///
    /// Maps iterate as `[key, value]` pairs.  Ranges are expanded.
    pub fn try_iter(&self) -> Option<Vec<Value>> {
        match self.0 {
            ValueRepr::Seq(ref s) => Some(s.to_vec()),
            ValueRepr::Map(ref m) => Some(
                m.iter()
                    .map(|(k, v)| Value::from(vec![Value::from(k.clone()), v.clone()]))
                    .collect(),
            ),
            ValueRepr::Range(start, end) => Some((start..=end).map(Value::from).collect()),
            ValueRepr::Object(ref obj) => obj.enumerate(),
            _ => None,
        }
    }

    /// Like [`try_iter`](Self::try_iter) but only returns the items in the
    /// window starting at `offset` that is at most `limit` items long.
    ///
    /// Ranges only produce the items inside the window.
    pub fn try_iter_window(&self, offset: usize, limit: Option<usize>) -> Option<Vec<Value>> {
        let limit = limit.unwrap_or(usize::MAX);
        match self.0 {
            ValueRepr::Range(start, end) => {
                let count = range_len(start, end).saturating_sub(offset).min(limit);
                let first = start as i128 + offset as i128;
                Some(
                    (0..count)
                        .map(|idx| Value::from((first + idx as i128) as i64))
                        .collect(),
                )
            }
            _ => self
                .try_iter()
                .map(|items| items.into_iter().skip(offset).take(limit).collect()),
        }
    }

    /// Looks up an item by integer index.
    ///
    /// Negative indexes count from the end.  Out of range indexes produce
    /// `None`.
    pub fn get_index(&self, idx: i64) -> Option<Value> {
        match self.0 {
            ValueRepr::Seq(ref s) => {
                let idx = some!(normalize_index(idx, s.len()));
                s.get(idx).cloned()
            }
            ValueRepr::Range(start, end) => {
                let (start, end) = (start as i128, end as i128);
                let rv = if idx < 0 {
                    end + 1 + idx as i128
                } else {
                    start + idx as i128
                };
                if rv >= start && rv <= end {
                    Some(Value::from(rv as i64))
                } else {
                    None
                }
            }
            ValueRepr::Object(ref obj) => {
                let items = some!(obj.enumerate());
                let idx = some!(normalize_index(idx, items.len()));
                items.into_iter().nth(idx)
            }
            _ => None,
        }
    }

    /// Looks up a key in a map value.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref m) => m.get(key).cloned(),
            _ => None,
        }
    }
}

/// Number of items in an inclusive range, saturated to `usize::MAX`.
pub(crate) fn range_len(start: i64, end: i64) -> usize {
    if end < start {
        0
    } else {
        usize::try_from(end as i128 - start as i128 + 1).unwrap_or(usize::MAX)
    }
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    if idx < 0 {
        usize::try_from(len as i128 + idx as i128).ok()
    } else {
        usize::try_from(idx).ok()
    }
}

/// Merges multiple map values into one.  Keys seen first win.
///
/// Values that are not maps are ignored.
pub fn merge_maps<I: IntoIterator<Item = Value>>(values: I) -> Value {
    let mut rv = ValueMap::new();
    for value in values {
        if let ValueRepr::Map(ref map) = value.0 {
            for (key, value) in map.iter() {
                if !rv.contains_key(key) {
                    rv.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Value::from(rv)
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // enable round tripping of values
        if serializing_for_value() {
            return serialize::serialize_handle(self, serializer);
        }

        match self.0 {
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::Undefined | ValueRepr::Nil | ValueRepr::Empty | ValueRepr::Blank => {
                serializer.serialize_unit()
            }
            ValueRepr::String(ref s) => serializer.serialize_str(s),
            ValueRepr::Seq(ref items) => {
                let mut seq = ok!(serializer.serialize_seq(Some(items.len())));
                for item in items.iter() {
                    ok!(seq.serialize_element(item));
                }
                seq.end()
            }
            ValueRepr::Map(ref entries) => {
                let mut map = ok!(serializer.serialize_map(Some(entries.len())));
                for (k, v) in entries.iter() {
                    ok!(map.serialize_entry(&**k, v));
                }
                map.end()
            }
            ValueRepr::Range(start, end) => {
                let mut seq = ok!(serializer.serialize_seq(None));
                for item in start..=end {
                    ok!(seq.serialize_element(&item));
                }
                seq.end()
            }
            #[cfg(feature = "datetime")]
            ValueRepr::DateTime(_) => serializer.collect_str(self),
            ValueRepr::Object(ref obj) => match obj.enumerate() {
                Some(items) => {
                    let mut seq = ok!(serializer.serialize_seq(Some(items.len())));
                    for item in items.iter() {
                        ok!(seq.serialize_element(item));
                    }
                    seq.end()
                }
                None => serializer.collect_str(self),
            },
        }
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                Value(ValueRepr::$dst(val as _))
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        match i64::try_from(val) {
            Ok(val) => Value(ValueRepr::I64(val)),
            Err(_) => Value(ValueRepr::F64(val as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        Value::from(val.to_string())
    }
}

impl<'a> From<&'a str> for Value {
    #[inline(always)]
    fn from(val: &'a str) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<Arc<str>> for Value {
    #[inline(always)]
    fn from(val: Arc<str>) -> Self {
        Value(ValueRepr::String(val))
    }
}

impl<'a> From<Cow<'a, str>> for Value {
    #[inline(always)]
    fn from(val: Cow<'a, str>) -> Self {
        match val {
            Cow::Borrowed(x) => x.into(),
            Cow::Owned(x) => x.into(),
        }
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        Value::NIL
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value::NIL,
        }
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        Value(ValueRepr::Map(Arc::new(val)))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        val.into_iter().collect()
    }
}

impl<K: AsRef<str>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl<K: AsRef<str>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(val: HashMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl From<Arc<dyn Object>> for Value {
    fn from(val: Arc<dyn Object>) -> Self {
        Value(ValueRepr::Object(val))
    }
}

#[cfg(feature = "datetime")]
impl From<time::OffsetDateTime> for Value {
    fn from(val: time::OffsetDateTime) -> Self {
        Value(ValueRepr::DateTime(val))
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        let vec: Vec<Value> = iter.into_iter().map(Into::into).collect();
        Value(ValueRepr::Seq(Arc::new(vec)))
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map: ValueMap = iter
            .into_iter()
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into()))
            .collect();
        Value::from(map)
    }
}
