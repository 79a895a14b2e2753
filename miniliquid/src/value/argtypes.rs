use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

use crate::context::Context;
use crate::error::{Error, ErrorKind};
use crate::filters::Signature;
use crate::value::ops::{as_number, parse_number, Number};
use crate::value::{Value, ValueKind, ValueRepr};

/// A utility trait that represents the return value of filters.
///
/// It's implemented for the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
pub trait FunctionResult {
    #[doc(hidden)]
    fn into_result(self) -> Result<Value, Error>;
}

impl<I: Into<Value>> FunctionResult for Result<I, Error> {
    fn into_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<I: Into<Value>> FunctionResult for I {
    fn into_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Describes how a parameter participates in filter dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// The parameter has to be supplied.
    Required,
    /// The parameter may be left out.
    Optional,
    /// The parameter receives the active [`Context`] and is not supplied
    /// by the template.
    Context,
    /// The parameter collects all remaining arguments.
    Rest,
}

/// Helper trait representing valid filter arguments.
///
/// Filters are written with concrete types and this trait performs the
/// conversion from the values the template supplies.  It is implemented
/// for tuples of up to five [`ArgType`]s.  The trait also reports the
/// [`Signature`] which the dispatcher uses to pick between overloads.
pub trait FunctionArgs<'a> {
    /// The output type of the function arguments.
    type Output;

    /// Converts to function arguments from a slice of values.
    #[doc(hidden)]
    fn from_values(ctx: Option<&'a Context<'a>>, values: &'a [Value])
        -> Result<Self::Output, Error>;

    /// Describes the parameters.
    #[doc(hidden)]
    fn signature() -> Signature;
}

/// Utility function to convert a slice of values into arguments.
///
/// ```
/// use miniliquid::value::{from_args, Value};
/// # fn foo() -> Result<(), miniliquid::Error> {
/// let args = vec![Value::from("foo"), Value::from(42i64)];
/// let (string, num): (&str, i64) = from_args(&args[..])?;
/// # Ok(()) } fn main() { foo().unwrap(); }
/// ```
#[inline(always)]
pub fn from_args<'a, Args>(values: &'a [Value]) -> Result<Args, Error>
where
    Args: FunctionArgs<'a, Output = Args>,
{
    Args::from_values(None, values)
}

/// A trait implemented by all filter argument types.
///
/// It's implemented for the following types:
///
/// * the active context: [`&Context`](crate::Context) (does not consume an argument)
/// * integers: [`i32`], [`i64`], [`u32`], [`u64`], [`usize`]
/// * floats: [`f64`]
/// * bool: [`bool`]
/// * string: [`String`], [`&str`], `Cow<'_, str>`
/// * values: [`Value`], `&Value`
/// * vectors: [`Vec<T>`]
///
/// `Option<T>` marks an optional parameter and [`Rest<T>`] collects the
/// remaining arguments.  Numbers are also accepted from numeric strings.
pub trait ArgType<'a> {
    /// The output type of this argument.
    type Output;

    /// How the parameter participates in dispatch.
    const KIND: ArgKind = ArgKind::Required;

    #[doc(hidden)]
    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error>;

    #[doc(hidden)]
    fn from_value_owned(_value: Value) -> Result<Self::Output, Error> {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "type conversion is not legal in this situation (implicit borrow)",
        ))
    }

    #[doc(hidden)]
    fn from_context_and_value(
        _ctx: Option<&'a Context<'a>>,
        value: Option<&'a Value>,
    ) -> Result<(Self::Output, usize), Error> {
        Ok((ok!(Self::from_value(value)), 1))
    }

    #[doc(hidden)]
    #[inline(always)]
    fn from_context_and_values(
        ctx: Option<&'a Context<'a>>,
        values: &'a [Value],
        offset: usize,
    ) -> Result<(Self::Output, usize), Error> {
        Self::from_context_and_value(ctx, values.get(offset))
    }
}

fn signature_from_kinds(kinds: &[ArgKind]) -> Signature {
    let mut rv = Signature::default();
    for kind in kinds {
        match kind {
            ArgKind::Context => rv.takes_context = true,
            ArgKind::Required => rv.required += 1,
            ArgKind::Optional => rv.optional += 1,
            ArgKind::Rest => rv.variadic = true,
        }
    }
    rv
}

macro_rules! tuple_impls {
    ( $( $name:ident )* * $rest_name:ident ) => {
        impl<'a, $($name,)* $rest_name> FunctionArgs<'a> for ($($name,)* $rest_name,)
            where $($name: ArgType<'a>,)* $rest_name: ArgType<'a>
        {
            type Output = ($($name::Output,)* $rest_name::Output ,);

            fn from_values(ctx: Option<&'a Context<'a>>, values: &'a [Value]) -> Result<Self::Output, Error> {
                #![allow(non_snake_case, unused)]
                let mut idx = 0;
                $(
                    let ($name, offset) = ok!($name::from_context_and_value(ctx, values.get(idx)));
                    idx += offset;
                )*
                let ($rest_name, offset) = ok!($rest_name::from_context_and_values(ctx, values, idx));
                idx += offset;
                if values.get(idx).is_some() {
                    Err(Error::from(ErrorKind::TooManyArguments))
                } else {
                    Ok(( $($name,)* $rest_name,))
                }
            }

            fn signature() -> Signature {
                signature_from_kinds(&[$($name::KIND,)* $rest_name::KIND])
            }
        }
    };
}

impl<'a> FunctionArgs<'a> for () {
    type Output = ();

    fn from_values(_ctx: Option<&'a Context<'a>>, values: &'a [Value]) -> Result<(), Error> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(Error::from(ErrorKind::TooManyArguments))
        }
    }

    fn signature() -> Signature {
        Signature::default()
    }
}

tuple_impls! { *A }
tuple_impls! { A *B }
tuple_impls! { A B *C }
tuple_impls! { A B C *D }
tuple_impls! { A B C D *E }

fn unsupported_conversion(kind: ValueKind, target: &str) -> Error {
    Error::new(
        ErrorKind::InvalidArguments,
        format!("cannot convert {kind} to {target}"),
    )
}

fn value_to_number(value: &Value) -> Option<Number> {
    match value.0 {
        ValueRepr::String(ref s) => parse_number(s),
        _ => as_number(value),
    }
}

macro_rules! int_arg {
    ($ty:ident) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value_to_number(&value) {
                    Some(Number::Int(x)) => $ty::try_from(x).ok(),
                    Some(Number::Float(x)) if x.fract() == 0.0 => $ty::try_from(x as i64).ok(),
                    _ => None,
                }
                .ok_or_else(|| unsupported_conversion(value.kind(), stringify!($ty)))
            }
        }

        impl<'a> ArgType<'a> for $ty {
            type Output = Self;

            fn from_value(value: Option<&Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => TryFrom::try_from(value.clone()),
                    None => Err(Error::from(ErrorKind::MissingArgument)),
                }
            }

            fn from_value_owned(value: Value) -> Result<Self, Error> {
                TryFrom::try_from(value)
            }
        }
    };
}

int_arg!(i32);
int_arg!(i64);
int_arg!(u32);
int_arg!(u64);
int_arg!(usize);

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value_to_number(&value)
            .map(Number::as_f64)
            .ok_or_else(|| unsupported_conversion(value.kind(), "f64"))
    }
}

impl<'a> ArgType<'a> for f64 {
    type Output = Self;

    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => TryFrom::try_from(value.clone()),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        TryFrom::try_from(value)
    }
}

impl<'a> ArgType<'a> for bool {
    type Output = Self;

    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.is_truthy()),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        Ok(value.is_truthy())
    }
}

impl<'a> ArgType<'a> for &str {
    type Output = &'a str;

    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error> {
        match value {
            Some(value) => value
                .as_str()
                .ok_or_else(|| unsupported_conversion(value.kind(), "string")),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }
}

impl<'a> ArgType<'a> for Cow<'_, str> {
    type Output = Cow<'a, str>;

    #[inline(always)]
    fn from_value(value: Option<&'a Value>) -> Result<Cow<'a, str>, Error> {
        match value {
            Some(value) => Ok(match value.0 {
                ValueRepr::String(ref s) => Cow::Borrowed(s),
                _ => Cow::Owned(value.to_string()),
            }),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }

    fn from_value_owned(value: Value) -> Result<Cow<'a, str>, Error> {
        Ok(Cow::Owned(value.to_string()))
    }
}

impl<'a> ArgType<'a> for &Value {
    type Output = &'a Value;

    #[inline(always)]
    fn from_value(value: Option<&'a Value>) -> Result<&'a Value, Error> {
        match value {
            Some(value) => Ok(value),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }
}

impl<'a> ArgType<'a> for &Context<'_> {
    type Output = &'a Context<'a>;

    const KIND: ArgKind = ArgKind::Context;

    fn from_value(_value: Option<&'a Value>) -> Result<Self::Output, Error> {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "cannot use context type in this position",
        ))
    }

    fn from_context_and_value(
        ctx: Option<&'a Context<'a>>,
        _value: Option<&'a Value>,
    ) -> Result<(Self::Output, usize), Error> {
        match ctx {
            None => Err(Error::new(ErrorKind::InvalidOperation, "context unavailable")),
            Some(ctx) => Ok((ctx, 0)),
        }
    }
}

impl<'a, T: ArgType<'a>> ArgType<'a> for Option<T> {
    type Output = Option<T::Output>;

    const KIND: ArgKind = ArgKind::Optional;

    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error> {
        match value {
            Some(value) => {
                if value.is_nil() {
                    Ok(None)
                } else {
                    T::from_value(Some(value)).map(Some)
                }
            }
            None => Ok(None),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self::Output, Error> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value_owned(value).map(Some)
        }
    }
}

/// Utility type to capture remaining arguments.
///
/// When used as the last parameter of a filter, all remaining arguments are
/// collected here.  The type derefs into the inner vector.
///
/// ```
/// # use miniliquid::Environment;
/// # let mut env = Environment::new();
/// use miniliquid::value::Rest;
///
/// fn sum(value: i64, values: Rest<i64>) -> i64 {
///     value + values.iter().sum::<i64>()
/// }
///
/// env.add_filter("sum", sum);
/// ```
#[derive(Debug)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Deref for Rest<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Rest<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'a, T: ArgType<'a, Output = T>> ArgType<'a> for Rest<T> {
    type Output = Self;

    const KIND: ArgKind = ArgKind::Rest;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        Ok(Rest(ok!(value
            .into_iter()
            .map(|v| T::from_value(Some(v)))
            .collect::<Result<_, _>>())))
    }

    fn from_context_and_values(
        _ctx: Option<&'a Context<'a>>,
        values: &'a [Value],
        offset: usize,
    ) -> Result<(Self, usize), Error> {
        let args = values.get(offset..).unwrap_or_default();
        Ok((
            Rest(ok!(args
                .iter()
                .map(|v| T::from_value(Some(v)))
                .collect::<Result<_, _>>())),
            args.len(),
        ))
    }
}

impl<'a> ArgType<'a> for Value {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.clone()),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl<'a> ArgType<'a> for String {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.to_string()),
            None => Err(Error::from(ErrorKind::MissingArgument)),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        Ok(value.to_string())
    }
}

impl<'a, T: ArgType<'a, Output = T>> ArgType<'a> for Vec<T> {
    type Output = Vec<T>;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Vec::new()),
            Some(value) => Self::from_value_owned(value.clone()),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        let items = ok!(value
            .try_iter()
            .ok_or_else(|| unsupported_conversion(value.kind(), "sequence")));
        let mut rv = Vec::with_capacity(items.len());
        for item in items {
            rv.push(ok!(T::from_value_owned(item)));
        }
        Ok(rv)
    }
}

impl From<Value> for String {
    fn from(val: Value) -> Self {
        val.to_string()
    }
}
