use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, RawWaker, RawWakerVTable, Waker};

use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// A boxed, sendable future as used by the asynchronous render path.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn memchr(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&x| x == needle)
}

/// Helper for dealing with untrusted size hints.
#[inline(always)]
pub(crate) fn untrusted_size_hint(value: usize) -> usize {
    value.min(1024)
}

/// Controls how render time errors are surfaced.
///
/// Errors are always recorded in the diagnostics of a render.  The error
/// mode controls what happens in the output.  Fatal errors (see
/// [`ErrorKind::is_fatal`]) abort the render regardless of this setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Errors produce no output.
    Suppress,
    /// Errors are rendered inline as `Liquid error: <message>`.
    #[default]
    Display,
    /// The first error aborts the render.
    Rethrow,
}

/// Selects between historically different evaluation rules.
///
/// The level never influences parsing.  It is consulted by filters and
/// the condition evaluator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SyntaxCompatibility {
    /// The classic rules.
    #[default]
    Liquid20,
    /// `capitalize` only touches the first character.
    Liquid21,
    /// Numbers no longer compare equal to numeric strings.
    Liquid22,
    /// `slice` operates on sequences.
    Liquid22a,
}

/// The policy used to match template names against registered names.
///
/// This applies to filters, operators and members of host objects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NamingConvention {
    /// Registered names are converted to `snake_case` and matched exactly.
    #[default]
    Ruby,
    /// Registered names are kept.  A template name also matches if it only
    /// differs in the case of the first letter.
    CSharp,
}

impl NamingConvention {
    /// Converts a name at registration time.
    pub fn registered_name(self, name: &str) -> String {
        match self {
            NamingConvention::Ruby => to_snake_case(name),
            NamingConvention::CSharp => name.to_string(),
        }
    }

    /// Checks if a name used in a template refers to a registered name.
    pub fn matches(self, registered: &str, requested: &str) -> bool {
        if registered == requested {
            return true;
        }
        match self {
            NamingConvention::Ruby => false,
            NamingConvention::CSharp => {
                let mut a = registered.chars();
                let mut b = requested.chars();
                match (a.next(), b.next()) {
                    (Some(x), Some(y)) => {
                        x != y && flip_case(x) == y && a.as_str() == b.as_str()
                    }
                    _ => false,
                }
            }
        }
    }
}

fn flip_case(c: char) -> char {
    if c.is_uppercase() {
        c.to_lowercase().next().unwrap_or(c)
    } else {
        c.to_uppercase().next().unwrap_or(c)
    }
}

/// Converts `CamelCase` and `mixedCase` into `snake_case`.
pub fn to_snake_case(name: &str) -> String {
    let mut rv = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_uppercase() {
            let next_is_lower = chars.peek().map_or(false, |x| x.is_lowercase());
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next_is_lower,
                _ => false,
            };
            if boundary {
                rv.push('_');
            }
            rv.extend(c.to_lowercase());
        } else {
            rv.push(c);
        }
        prev = Some(c);
    }
    rv
}

/// Formats numbers and dates for output.
///
/// The engine formats values with invariant rules by default.  A provider
/// lets the host apply culture specific formatting to numbers and points in
/// time.  Returning `None` falls back to the default formatting.
///
/// ```
/// use miniliquid::{FormatProvider, Value};
///
/// struct DecimalComma;
///
/// impl FormatProvider for DecimalComma {
///     fn format_number(&self, value: &Value) -> Option<String> {
///         let f = value.as_f64()?;
///         if f.fract() == 0.0 {
///             None
///         } else {
///             Some(f.to_string().replace('.', ","))
///         }
///     }
/// }
/// ```
pub trait FormatProvider: Send + Sync {
    /// Formats a number.
    fn format_number(&self, value: &Value) -> Option<String> {
        let _value = value;
        None
    }

    /// Formats a point in time.
    fn format_datetime(&self, value: &Value) -> Option<String> {
        let _value = value;
        None
    }
}

/// A cooperative cancellation signal for renders.
///
/// The renderer checks the token before every node.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a fresh token that is not cancelled.
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Requests cancellation of all renders observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn noop_raw_waker() -> RawWaker {
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

/// Drives a future that is expected to complete without suspending.
///
/// The synchronous render walks the same future tree as the asynchronous
/// one.  If any step actually suspends, the render fails.
pub(crate) fn resolve_now<T>(fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
    // SAFETY: the vtable functions ignore the data pointer
    let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
    let mut cx = TaskContext::from_waker(&waker);
    let mut fut = std::pin::pin!(fut);
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(rv) => rv,
        Poll::Pending => Err(Error::new(
            ErrorKind::AsyncRequired,
            "a filter, tag or template source suspended, use render_async",
        )),
    }
}

/// Helper to HTML escape a string.
pub struct HtmlEscape<'a>(pub &'a str);

impl<'a> fmt::Display for HtmlEscape<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "v_htmlescape")]
        {
            fmt::Display::fmt(&v_htmlescape::escape(self.0), f)
        }
        #[cfg(not(feature = "v_htmlescape"))]
        {
            let bytes = self.0.as_bytes();
            let mut start = 0;

            for (i, b) in bytes.iter().enumerate() {
                let escaped = match *b {
                    b'<' => "&lt;",
                    b'>' => "&gt;",
                    b'&' => "&amp;",
                    b'"' => "&quot;",
                    b'\'' => "&#x27;",
                    b'/' => "&#x2f;",
                    _ => continue,
                };
                if start < i {
                    ok!(f.write_str(&self.0[start..i]));
                }
                ok!(f.write_str(escaped));
                start = i + 1;
            }

            if start < bytes.len() {
                f.write_str(&self.0[start..])
            } else {
                Ok(())
            }
        }
    }
}

pub struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Splits a string on whitespace into at most `maxsplits` pieces.
#[cfg(feature = "builtins")]
pub fn splitn_whitespace(s: &str, maxsplits: usize) -> impl Iterator<Item = &str> + '_ {
    let mut splits = 1;
    let mut skip_ws = true;
    let mut split_start = None;
    let mut last_split_end = 0;
    let mut chars = s.char_indices();

    std::iter::from_fn(move || {
        for (idx, c) in chars.by_ref() {
            if splits >= maxsplits && !skip_ws {
                continue;
            } else if c.is_whitespace() {
                if let Some(old) = split_start {
                    let rv = &s[old..idx];
                    split_start = None;
                    last_split_end = idx;
                    splits += 1;
                    skip_ws = true;
                    return Some(rv);
                }
            } else {
                skip_ws = false;
                if split_start.is_none() {
                    split_start = Some(idx);
                    last_split_end = idx;
                }
            }
        }

        let rest = &s[last_split_end..];
        if !rest.is_empty() {
            last_split_end = s.len();
            Some(rest)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_html_escape() {
        let input = "<>&\"'/";
        let output = HtmlEscape(input).to_string();
        assert_eq!(output, "&lt;&gt;&amp;&quot;&#x27;&#x2f;");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("Upcase"), "upcase");
        assert_eq!(to_snake_case("ReplaceFirst"), "replace_first");
        assert_eq!(to_snake_case("newlineToBr"), "newline_to_br");
        assert_eq!(to_snake_case("URLEncode"), "url_encode");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_csharp_matching() {
        let nc = NamingConvention::CSharp;
        assert!(nc.matches("Upcase", "upcase"));
        assert!(nc.matches("Upcase", "Upcase"));
        assert!(!nc.matches("Upcase", "UPCASE"));
        assert!(!NamingConvention::Ruby.matches("upcase", "Upcase"));
    }

    #[test]
    fn test_resolve_now_pending() {
        let err = resolve_now(std::future::pending::<Result<(), Error>>()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AsyncRequired);
    }

    #[test]
    #[cfg(feature = "builtins")]
    fn test_splitn_whitespace() {
        fn s(s: &str, n: usize) -> Vec<&str> {
            splitn_whitespace(s, n).collect::<Vec<_>>()
        }

        assert_eq!(s("a b c", 1), vec!["a b c"]);
        assert_eq!(s("a b c", 2), vec!["a", "b c"]);
        assert_eq!(s("   a   b   c", 4), vec!["a", "b", "c"]);
    }
}
