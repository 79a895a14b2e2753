//! Filter functions and abstractions.
//!
//! Filters transform a value in an output expression.  In
//! `{{ product.title | truncate: 20, '...' }}` the filter `truncate` is
//! invoked with the title as input and `20` and `'...'` as arguments.
//! Filters are applied left to right.
//!
//! To create a custom filter write a function that takes at least the input
//! value and register it with [`add_filter`](crate::Environment::add_filter):
//!
//! ```
//! # use miniliquid::Environment;
//! # let mut env = Environment::new();
//! fn slugify(value: String) -> String {
//!     value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
//! }
//!
//! env.add_filter("slugify", slugify);
//! ```
//!
//! The arguments are converted automatically.  For more information see the
//! [`ArgType`](crate::value::ArgType) trait.
//!
//! # Overloads
//!
//! A name can be registered multiple times with different parameter counts.
//! When the filter is invoked the overload is picked by the number of
//! supplied values (the input counts as one):
//!
//! 1. an overload whose required parameters match exactly,
//! 2. otherwise an overload whose optional parameters cover the difference,
//! 3. otherwise a variadic overload.
//!
//! Registering a filter with the same parameter shape as an existing
//! overload replaces it.
//!
//! # Accessing the Context
//!
//! A filter can take [`&Context`](crate::Context) as first parameter.  The
//! context is supplied automatically and does not count as argument:
//!
//! ```
//! # use miniliquid::Environment;
//! # let mut env = Environment::new();
//! use miniliquid::Context;
//!
//! fn with_shop(ctx: &Context, value: String) -> String {
//!     let shop = ctx.lookup("shop_name").unwrap_or_default();
//!     format!("{value} ({shop})")
//! }
//!
//! env.add_filter("with_shop", with_shop);
//! ```
//!
//! # Asynchronous Filters
//!
//! Filters that need to wait on something can be registered with
//! [`add_async_filter`](crate::Environment::add_async_filter).  They take
//! owned arguments and return a future.  Such filters can only be used with
//! [`render_async`](crate::Template::render_async).
//!
//! # Built-in Filters
//!
//! When the `builtins` feature is enabled the standard filters are
//! automatically added to the environment.  They are also provided in this
//! module.
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, ErrorKind};
use crate::utils::{BoxFuture, NamingConvention};
use crate::value::{FunctionArgs, FunctionResult, Value};

/// The parameter shape of a filter.
///
/// The input value counts as a required parameter.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Signature {
    /// The first parameter receives the [`Context`].
    pub takes_context: bool,
    /// The number of required parameters.
    pub required: usize,
    /// The number of optional parameters.
    pub optional: usize,
    /// The last parameter collects all remaining values.
    pub variadic: bool,
}

impl Signature {
    fn covers(&self, supplied: usize) -> bool {
        supplied >= self.required
            && (self.variadic || supplied <= self.required + self.optional)
    }
}

type SyncFilterFunc = dyn Fn(&Context<'_>, &[Value]) -> Result<Value, Error> + Send + Sync;
type AsyncFilterFunc =
    dyn Fn(&[Value]) -> Result<BoxFuture<'static, Result<Value, Error>>, Error> + Send + Sync;

#[derive(Clone)]
pub(crate) enum FilterFunc {
    Sync(Arc<SyncFilterFunc>),
    Async(Arc<AsyncFilterFunc>),
}

/// A type erased filter with its signature.
#[derive(Clone)]
pub(crate) struct BoxedFilter {
    pub(crate) func: FilterFunc,
    pub(crate) signature: Signature,
    type_name: &'static str,
}

// Used as a marker for sealing traits.
#[doc(hidden)]
pub struct SealedMarker;

/// A utility trait that represents filters.
///
/// Filters are functions that take the input value and up to four more
/// parameters.  The parameters can be marked optional by using `Option<T>`
/// and the last one can be [`Rest<T>`](crate::value::Rest) to capture all
/// remaining arguments.  A leading `&Context` parameter receives the active
/// context.
///
/// A filter can return any of the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
pub trait Filter<Rv, Args>: Send + Sync + 'static {
    /// Applies a filter to value with the given arguments.
    #[doc(hidden)]
    fn apply_to(&self, args: Args, _: SealedMarker) -> Rv;
}

/// A utility trait that represents asynchronous filters.
///
/// Asynchronous filters take owned parameters (such as [`Value`],
/// [`String`] or `i64`) and return a future resolving to the result.
pub trait AsyncFilter<Rv, Args>: Send + Sync + 'static {
    /// Starts applying the filter.
    #[doc(hidden)]
    fn apply_async(&self, args: Args, _: SealedMarker) -> BoxFuture<'static, Result<Value, Error>>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Filter<Rv, ($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Rv + Send + Sync + 'static,
            Rv: FunctionResult,
        {
            fn apply_to(&self, args: ($($name,)*), _: SealedMarker) -> Rv {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)($($name,)*)
            }
        }

        impl<Func, Fut, Rv, $($name),*> AsyncFilter<Rv, ($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Rv> + Send + 'static,
            Rv: FunctionResult,
        {
            fn apply_async(&self, args: ($($name,)*), _: SealedMarker) -> BoxFuture<'static, Result<Value, Error>> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                let fut = (self)($($name,)*);
                Box::pin(async move { fut.await.into_result() })
            }
        }
    };
}

tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }
tuple_impls! { A B C D E }

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        BoxedFilter {
            func: FilterFunc::Sync(Arc::new(
                move |ctx: &Context<'_>, args: &[Value]| -> Result<Value, Error> {
                    f.apply_to(ok!(Args::from_values(Some(ctx), args)), SealedMarker)
                        .into_result()
                },
            )),
            signature: Args::signature(),
            type_name: std::any::type_name::<F>(),
        }
    }

    /// Creates a new boxed asynchronous filter.
    pub fn new_async<F, Rv, Args>(f: F) -> BoxedFilter
    where
        F: AsyncFilter<Rv, Args>,
        Args: for<'a> FunctionArgs<'a, Output = Args> + 'static,
    {
        BoxedFilter {
            func: FilterFunc::Async(Arc::new(move |args: &[Value]| {
                Ok(f.apply_async(ok!(Args::from_values(None, args)), SealedMarker))
            })),
            signature: Args::signature(),
            type_name: std::any::type_name::<F>(),
        }
    }
}

impl fmt::Debug for BoxedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.type_name, self.signature)
    }
}

/// A registry of filters by name.
///
/// Each name holds one or more overloads.
#[derive(Clone, Default)]
pub struct FilterSet {
    filters: BTreeMap<String, Vec<BoxedFilter>>,
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

impl FilterSet {
    /// Creates an empty filter set.
    pub fn new() -> FilterSet {
        FilterSet::default()
    }

    /// Adds a filter.  See [`Environment::add_filter`](crate::Environment::add_filter).
    pub fn add<F, Rv, Args>(&mut self, name: &str, f: F)
    where
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.insert(name, BoxedFilter::new(f));
    }

    /// Adds an asynchronous filter.
    pub fn add_async<F, Rv, Args>(&mut self, name: &str, f: F)
    where
        F: AsyncFilter<Rv, Args>,
        Args: for<'a> FunctionArgs<'a, Output = Args> + 'static,
    {
        self.insert(name, BoxedFilter::new_async(f));
    }

    pub(crate) fn insert(&mut self, name: &str, filter: BoxedFilter) {
        let overloads = self.filters.entry(name.to_string()).or_default();
        match overloads
            .iter_mut()
            .find(|x| x.signature == filter.signature)
        {
            Some(existing) => *existing = filter,
            None => overloads.push(filter),
        }
    }

    /// Removes all overloads of a filter.
    pub fn remove(&mut self, name: &str) {
        self.filters.remove(name);
    }

    /// Checks if the set has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Copies all filters of another set into this one.
    pub fn extend(&mut self, other: &FilterSet) {
        for (name, overloads) in &other.filters {
            for filter in overloads {
                self.insert(name, filter.clone());
            }
        }
    }

    pub(crate) fn lookup(&self, name: &str, convention: NamingConvention) -> Option<&[BoxedFilter]> {
        if let Some(rv) = self.filters.get(name) {
            return Some(rv);
        }
        self.filters
            .iter()
            .find(|(key, _)| convention.matches(&convention.registered_name(key), name))
            .map(|x| &x.1[..])
    }
}

/// Picks the overload for the given number of supplied values.
pub(crate) fn select_overload<'f>(
    name: &str,
    overloads: &'f [BoxedFilter],
    supplied: usize,
) -> Result<&'f BoxedFilter, Error> {
    let rv = overloads
        .iter()
        .find(|x| !x.signature.variadic && x.signature.required == supplied)
        .or_else(|| {
            overloads
                .iter()
                .filter(|x| !x.signature.variadic && x.signature.covers(supplied))
                .min_by_key(|x| x.signature.optional)
        })
        .or_else(|| {
            overloads
                .iter()
                .find(|x| x.signature.variadic && x.signature.covers(supplied))
        });
    match rv {
        Some(filter) => {
            log::trace!("selected overload {filter:?} of '{name}' for {supplied} values");
            Ok(filter)
        }
        None => Err(Error::new(
            ErrorKind::FilterInvocation,
            format!(
                "filter '{}' does not take {} argument{}",
                name,
                supplied.saturating_sub(1),
                if supplied == 2 { "" } else { "s" }
            ),
        )
        .with_subject(name)),
    }
}

/// Wraps an error raised while invoking a filter.
pub(crate) fn invocation_error(name: &str, err: Error) -> Error {
    if err.kind().is_fatal() || err.kind() == ErrorKind::FilterInvocation {
        return err;
    }
    Error::new(ErrorKind::FilterInvocation, err.message().into_owned())
        .with_subject(name)
        .with_source(err)
}

/// Escapes a string for use in HTML.
///
/// ```liquid
/// {{ '<p>' | escape }} -> &lt;p&gt;
/// ```
pub fn escape(value: Option<String>) -> String {
    crate::utils::HtmlEscape(value.as_deref().unwrap_or_default()).to_string()
}

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;

    use std::borrow::Cow;

    use crate::utils::{splitn_whitespace, SyntaxCompatibility};
    use crate::value::ops;

    /// Returns the size of a string, sequence or map.
    ///
    /// ```liquid
    /// {{ 'hello' | size }} -> 5
    /// ```
    pub fn size(value: &Value) -> usize {
        value.len().unwrap_or(0)
    }

    /// Converts a string to uppercase.
    pub fn upcase(value: Cow<'_, str>) -> String {
        value.to_uppercase()
    }

    /// Converts a string to lowercase.
    pub fn downcase(value: Cow<'_, str>) -> String {
        value.to_lowercase()
    }

    /// Capitalizes a string.
    ///
    /// Starting with [`SyntaxCompatibility::Liquid21`] only the first
    /// character is changed.  Before that the first character of every word
    /// is converted to uppercase.
    pub fn capitalize(ctx: &Context, value: Cow<'_, str>) -> String {
        fn upper_first(word: &str) -> String {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
            }
        }

        if ctx.syntax_compatibility() >= SyntaxCompatibility::Liquid21 {
            return upper_first(value.trim_start());
        }
        let mut rv = String::with_capacity(value.len());
        let mut at_word_start = true;
        for c in value.chars() {
            if at_word_start && !c.is_whitespace() {
                rv.extend(c.to_uppercase());
            } else {
                rv.push(c);
            }
            at_word_start = c.is_whitespace();
        }
        rv
    }

    /// Appends a string.
    pub fn append(value: Cow<'_, str>, suffix: Cow<'_, str>) -> String {
        value.into_owned() + &suffix
    }

    /// Prepends a string.
    pub fn prepend(value: Cow<'_, str>, prefix: Cow<'_, str>) -> String {
        prefix.into_owned() + &value
    }

    /// Removes leading and trailing whitespace.
    pub fn strip(value: Cow<'_, str>) -> String {
        value.trim().to_string()
    }

    /// Removes leading whitespace.
    pub fn lstrip(value: Cow<'_, str>) -> String {
        value.trim_start().to_string()
    }

    /// Removes trailing whitespace.
    pub fn rstrip(value: Cow<'_, str>) -> String {
        value.trim_end().to_string()
    }

    /// Replaces every occurrence of a string.
    ///
    /// ```liquid
    /// {{ 'Hello World' | replace: 'Hello', 'Goodbye' }} -> Goodbye World
    /// ```
    pub fn replace(
        value: Cow<'_, str>,
        from: Cow<'_, str>,
        to: Option<Cow<'_, str>>,
    ) -> String {
        if from.is_empty() {
            return value.into_owned();
        }
        value.replace(&from as &str, to.as_deref().unwrap_or_default())
    }

    /// Replaces the first occurrence of a string.
    pub fn replace_first(
        value: Cow<'_, str>,
        from: Cow<'_, str>,
        to: Option<Cow<'_, str>>,
    ) -> String {
        if from.is_empty() {
            return value.into_owned();
        }
        value.replacen(&from as &str, to.as_deref().unwrap_or_default(), 1)
    }

    /// Removes every occurrence of a string.
    pub fn remove(value: Cow<'_, str>, what: Cow<'_, str>) -> String {
        replace(value, what, None)
    }

    /// Removes the first occurrence of a string.
    pub fn remove_first(value: Cow<'_, str>, what: Cow<'_, str>) -> String {
        replace_first(value, what, None)
    }

    /// Truncates a string to the given number of characters.
    ///
    /// The ellipsis (defaults to `...`) counts towards the length.
    ///
    /// ```liquid
    /// {{ 'Ground control to Major Tom.' | truncate: 20 }} -> Ground control to...
    /// ```
    pub fn truncate(
        value: Cow<'_, str>,
        length: Option<i64>,
        ellipsis: Option<Cow<'_, str>>,
    ) -> String {
        let length = length.unwrap_or(50).max(0) as usize;
        let ellipsis = ellipsis.unwrap_or(Cow::Borrowed("..."));
        if value.chars().count() <= length {
            return value.into_owned();
        }
        let keep = length.saturating_sub(ellipsis.chars().count());
        value.chars().take(keep).collect::<String>() + &ellipsis
    }

    /// Truncates a string to the given number of words.
    pub fn truncatewords(
        value: Cow<'_, str>,
        words: Option<i64>,
        ellipsis: Option<Cow<'_, str>>,
    ) -> String {
        let words = words.unwrap_or(15).max(1) as usize;
        let pieces = value.split_whitespace().collect::<Vec<_>>();
        if pieces.len() <= words {
            return value.into_owned();
        }
        pieces[..words].join(" ") + ellipsis.as_deref().unwrap_or("...")
    }

    /// Splits a string into a sequence.
    ///
    /// Splitting on a single space splits on runs of whitespace.  Splitting
    /// on an empty string returns the characters.  Trailing empty pieces are
    /// dropped.
    pub fn split(value: Cow<'_, str>, pattern: Option<Cow<'_, str>>) -> Value {
        let pattern = pattern.unwrap_or(Cow::Borrowed(" "));
        if pattern == " " {
            return splitn_whitespace(&value, usize::MAX).map(Value::from).collect();
        }
        if pattern.is_empty() {
            return value.chars().map(Value::from).collect();
        }
        let mut pieces = value.split(&pattern as &str).collect::<Vec<_>>();
        while pieces.last().map_or(false, |x| x.is_empty()) {
            pieces.pop();
        }
        pieces.into_iter().map(Value::from).collect()
    }

    /// Joins the items of a sequence with a separator.
    ///
    /// The separator defaults to a single space.
    pub fn join(value: &Value, separator: Option<Cow<'_, str>>) -> String {
        let separator = separator.as_deref().unwrap_or(" ");
        match value.as_str() {
            Some(s) => s.to_string(),
            None => match value.try_iter() {
                Some(items) => items
                    .iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(separator),
                None => value.to_string(),
            },
        }
    }

    /// Returns the first item of a sequence or the first character of a string.
    pub fn first(value: &Value) -> Value {
        match value.as_str() {
            Some(s) => Value::from(s.chars().next()),
            None => value.get_index(0).unwrap_or(Value::NIL),
        }
    }

    /// Returns the last item of a sequence or the last character of a string.
    pub fn last(value: &Value) -> Value {
        match value.as_str() {
            Some(s) => Value::from(s.chars().next_back()),
            None => value.get_index(-1).unwrap_or(Value::NIL),
        }
    }

    /// Reverses a sequence or a string.
    pub fn reverse(value: &Value) -> Value {
        match value.as_str() {
            Some(s) => Value::from(s.chars().rev().collect::<String>()),
            None => match value.try_iter() {
                Some(mut items) => {
                    items.reverse();
                    Value::from(items)
                }
                None => value.clone(),
            },
        }
    }

    fn sort_key(ctx: &Context, item: &Value, key: Option<&str>) -> Value {
        match key {
            Some(key) => ctx.get_member(item, key).unwrap_or(Value::NIL),
            None => item.clone(),
        }
    }

    /// Sorts a sequence, optionally by a member of the items.
    ///
    /// ```liquid
    /// {% assign by_price = products | sort: 'price' %}
    /// ```
    pub fn sort(ctx: &Context, value: &Value, key: Option<Cow<'_, str>>) -> Value {
        match value.try_iter() {
            Some(mut items) => {
                let key = key.as_deref();
                items.sort_by(|a, b| {
                    ops::sort_cmp(&sort_key(ctx, a, key), &sort_key(ctx, b, key))
                });
                Value::from(items)
            }
            None => value.clone(),
        }
    }

    /// Removes duplicate items from a sequence.
    pub fn uniq(value: &Value) -> Value {
        match value.try_iter() {
            Some(items) => {
                let mut rv: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !rv.iter().any(|x| ops::strict_eq(x, &item)) {
                        rv.push(item);
                    }
                }
                Value::from(rv)
            }
            None => value.clone(),
        }
    }

    /// Extracts a member from every item of a sequence.
    ///
    /// ```liquid
    /// {{ products | map: 'title' | join: ', ' }}
    /// ```
    pub fn map(ctx: &Context, value: &Value, key: Cow<'_, str>) -> Value {
        match value.try_iter() {
            Some(items) => items
                .iter()
                .map(|item| ctx.get_member(item, &key).unwrap_or(Value::NIL))
                .collect(),
            None => ctx.get_member(value, &key).unwrap_or(Value::NIL),
        }
    }

    /// Removes `nil` items from a sequence.
    pub fn compact(value: &Value) -> Value {
        match value.try_iter() {
            Some(items) => items.into_iter().filter(|x| !x.is_nil()).collect(),
            None => value.clone(),
        }
    }

    fn slice_range(len: usize, start: i64, length: i64) -> Option<(usize, usize)> {
        let start = if start < 0 { len as i64 + start } else { start };
        if start < 0 || start as usize > len || length < 0 {
            return None;
        }
        let start = start as usize;
        Some((start, (start + length as usize).min(len)))
    }

    /// Returns a substring or a subsequence.
    ///
    /// A negative start counts from the end.  The length defaults to one.
    /// Sequences are sliced starting with
    /// [`SyntaxCompatibility::Liquid22a`], before that they are treated as
    /// their string representation.
    pub fn slice(ctx: &Context, value: &Value, start: i64, length: Option<i64>) -> Value {
        let length = length.unwrap_or(1);
        if ctx.syntax_compatibility() >= SyntaxCompatibility::Liquid22a {
            if let Some(items) = value.as_slice() {
                return match slice_range(items.len(), start, length) {
                    Some((start, end)) => Value::from(items[start..end].to_vec()),
                    None => Value::from(Vec::<Value>::new()),
                };
            }
        }
        let s = value.to_string();
        let chars = s.chars().collect::<Vec<_>>();
        match slice_range(chars.len(), start, length) {
            Some((start, end)) => Value::from(chars[start..end].iter().collect::<String>()),
            None => Value::from(""),
        }
    }

    /// Returns a fallback if the value is `nil`, `false` or empty.
    ///
    /// ```liquid
    /// {{ product.label | default: 'none' }}
    /// ```
    pub fn default(value: &Value, fallback: Option<&Value>) -> Value {
        if !value.is_truthy() || value.is_empty() {
            fallback.cloned().unwrap_or_else(|| Value::from(""))
        } else {
            value.clone()
        }
    }

    /// Adds two numbers.
    pub fn plus(value: &Value, other: &Value) -> Result<Value, Error> {
        ops::add(value, other)
    }

    /// Subtracts a number.
    pub fn minus(value: &Value, other: &Value) -> Result<Value, Error> {
        ops::sub(value, other)
    }

    /// Multiplies two numbers.
    pub fn times(value: &Value, other: &Value) -> Result<Value, Error> {
        ops::mul(value, other)
    }

    /// Divides a number.  Integer division rounds down.
    pub fn divided_by(value: &Value, other: &Value) -> Result<Value, Error> {
        ops::div(value, other)
    }

    /// Returns the remainder of a division.
    pub fn modulo(value: &Value, other: &Value) -> Result<Value, Error> {
        ops::rem(value, other)
    }

    fn number(value: &Value) -> Result<ops::Number, Error> {
        ops::to_number(value).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArguments,
                format!("{:?} is not a number", value.to_string()),
            )
        })
    }

    /// Rounds a number to the given number of decimal places.
    ///
    /// Without decimal places the result is an integer.
    pub fn round(value: &Value, digits: Option<i32>) -> Result<Value, Error> {
        match (ok!(number(value)), digits.unwrap_or(0)) {
            (ops::Number::Int(x), _) => Ok(Value::from(x)),
            (ops::Number::Float(x), 0) => Ok(Value::from(x.round() as i64)),
            (ops::Number::Float(x), digits) => {
                let factor = 10f64.powi(digits);
                Ok(Value::from((x * factor).round() / factor))
            }
        }
    }

    /// Returns the absolute value of a number.
    pub fn abs(value: &Value) -> Result<Value, Error> {
        match ok!(number(value)) {
            ops::Number::Int(x) => Ok(x
                .checked_abs()
                .map_or(Value::from((x as f64).abs()), Value::from)),
            ops::Number::Float(x) => Ok(Value::from(x.abs())),
        }
    }

    /// Replaces line breaks with `<br />` tags.
    pub fn newline_to_br(value: Cow<'_, str>) -> String {
        value.replace("\r\n", "\n").replace('\n', "<br />\n")
    }

    /// Removes line breaks.
    pub fn strip_newlines(value: Cow<'_, str>) -> String {
        value.replace(['\r', '\n'], "")
    }

    /// Formats a point in time.
    ///
    /// The input can be a date value, a unix timestamp, `now`/`today` or a
    /// string in RFC 3339 or `YYYY-MM-DD[ HH:MM:SS]` format.  The format
    /// uses `strftime` directives.  Inputs that are not dates are returned
    /// unchanged.
    ///
    /// ```liquid
    /// {{ article.published_at | date: '%a, %b %d, %y' }}
    /// ```
    #[cfg(feature = "datetime")]
    pub fn date(value: &Value, format: Cow<'_, str>) -> Value {
        if format.is_empty() {
            return value.clone();
        }
        match datetime::to_datetime(value) {
            Some(dt) => Value::from(datetime::strftime(dt, &format)),
            None => value.clone(),
        }
    }

    /// Serializes a value to JSON.
    #[cfg(feature = "json")]
    pub fn json(value: &Value) -> Result<String, Error> {
        serde_json::to_string(value).map_err(|err| {
            Error::new(ErrorKind::InvalidOperation, "cannot serialize to JSON").with_source(err)
        })
    }

    #[cfg(feature = "urlencode")]
    const URL_SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
        .remove(b'*')
        .remove(b'.')
        .remove(b'-')
        .remove(b'_');

    /// Percent encodes a string for use in URLs.  Spaces become `+`.
    #[cfg(feature = "urlencode")]
    pub fn url_encode(value: Cow<'_, str>) -> String {
        percent_encoding::utf8_percent_encode(&value, URL_SET)
            .to_string()
            .replace("%20", "+")
    }

    /// Decodes a percent encoded string.
    #[cfg(feature = "urlencode")]
    pub fn url_decode(value: Cow<'_, str>) -> String {
        let value = value.replace('+', " ");
        percent_encoding::percent_decode_str(&value)
            .decode_utf8_lossy()
            .into_owned()
    }

    #[cfg(feature = "datetime")]
    mod datetime {
        use std::fmt::Write;

        use time::format_description::well_known::Rfc3339;
        use time::macros::format_description;
        use time::{Date, OffsetDateTime, PrimitiveDateTime};

        use crate::value::Value;

        pub fn to_datetime(value: &Value) -> Option<OffsetDateTime> {
            if let Some(dt) = value.as_datetime() {
                return Some(dt);
            }
            if let Some(ts) = value.as_i64() {
                return OffsetDateTime::from_unix_timestamp(ts).ok();
            }
            let s = value.as_str()?.trim();
            match s {
                "now" | "today" => return Some(OffsetDateTime::now_utc()),
                _ => {}
            }
            if let Ok(ts) = s.parse::<i64>() {
                return OffsetDateTime::from_unix_timestamp(ts).ok();
            }
            if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
                return Some(dt);
            }
            if let Ok(dt) = PrimitiveDateTime::parse(
                s,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            ) {
                return Some(dt.assume_utc());
            }
            Date::parse(s, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|d| d.midnight().assume_utc())
        }

        pub fn strftime(dt: OffsetDateTime, format: &str) -> String {
            let mut rv = String::with_capacity(format.len() + 16);
            let mut chars = format.chars();
            while let Some(c) = chars.next() {
                if c != '%' {
                    rv.push(c);
                    continue;
                }
                let hour12 = match dt.hour() % 12 {
                    0 => 12,
                    x => x,
                };
                let month = dt.month().to_string();
                let weekday = dt.weekday().to_string();
                // writing into a string cannot fail
                let _ = match chars.next() {
                    Some('Y') => write!(rv, "{}", dt.year()),
                    Some('y') => write!(rv, "{:02}", dt.year().rem_euclid(100)),
                    Some('m') => write!(rv, "{:02}", dt.month() as u8),
                    Some('d') => write!(rv, "{:02}", dt.day()),
                    Some('e') => write!(rv, "{:>2}", dt.day()),
                    Some('j') => write!(rv, "{:03}", dt.ordinal()),
                    Some('H') => write!(rv, "{:02}", dt.hour()),
                    Some('I') => write!(rv, "{hour12:02}"),
                    Some('l') => write!(rv, "{hour12:>2}"),
                    Some('M') => write!(rv, "{:02}", dt.minute()),
                    Some('S') => write!(rv, "{:02}", dt.second()),
                    Some('L') => write!(rv, "{:03}", dt.millisecond()),
                    Some('p') => rv.write_str(if dt.hour() < 12 { "AM" } else { "PM" }),
                    Some('P') => rv.write_str(if dt.hour() < 12 { "am" } else { "pm" }),
                    Some('B') => rv.write_str(&month),
                    Some('b') | Some('h') => rv.write_str(&month[..3]),
                    Some('A') => rv.write_str(&weekday),
                    Some('a') => rv.write_str(&weekday[..3]),
                    Some('u') => write!(rv, "{}", dt.weekday().number_from_monday()),
                    Some('w') => write!(rv, "{}", dt.weekday().number_days_from_sunday()),
                    Some('s') => write!(rv, "{}", dt.unix_timestamp()),
                    Some('z') => {
                        let (h, m, _) = dt.offset().as_hms();
                        let sign = if dt.offset().is_negative() { '-' } else { '+' };
                        write!(rv, "{}{:02}{:02}", sign, h.abs(), m.abs())
                    }
                    Some('F') => write!(
                        rv,
                        "{}-{:02}-{:02}",
                        dt.year(),
                        dt.month() as u8,
                        dt.day()
                    ),
                    Some('T') => write!(
                        rv,
                        "{:02}:{:02}:{:02}",
                        dt.hour(),
                        dt.minute(),
                        dt.second()
                    ),
                    Some('%') => rv.write_char('%'),
                    Some(other) => write!(rv, "%{other}"),
                    None => rv.write_char('%'),
                };
            }
            rv
        }

    }
}

#[cfg(feature = "builtins")]
pub use self::builtins::*;
