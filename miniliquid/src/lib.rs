//! <div align=center>
//!   <p><strong>MiniLiquid: a sandboxed Liquid template engine for Rust</strong></p>
//! </div>
//!
//! MiniLiquid is a template engine for Rust that implements the
//! [Liquid](https://shopify.github.io/liquid/) template language in the
//! flavor of DotLiquid.  It's implemented on top of [`serde`].  Templates
//! are written by untrusted authors: they cannot call into the host beyond
//! the filters, operators and tags it registers, and runaway templates are
//! stopped by a depth limit.
//!
//! ```liquid
//! {% for user in users %}
//!   <li>{{ user.name | escape }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! To use MiniLiquid one needs to create an [`Environment`] and parse
//! templates with it.  Afterwards templates can be rendered.  To pass data
//! one can pass any serde serializable value.  The [`context!`] macro can be
//! used to quickly construct a template context:
//!
//! ```
//! use miniliquid::{Environment, context};
//!
//! let env = Environment::new();
//! let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! For super trivial cases where you need to render a string once, you can
//! also use the [`render!`] macro which acts a bit like a replacement
//! for the [`format!`] macro.
//!
//! # Custom Filters
//!
//! MiniLiquid lets you register functions as filters with the engine.
//! A filter receives the piped value as first parameter and the arguments
//! given after the colon:
//!
//! ```
//! use miniliquid::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_filter("repeat", |value: String, n: usize| value.repeat(n));
//! let rv = env.render_str("{{ 'Na ' | repeat: 3 }}{{ name }}!", context!(name => "Batman"));
//! assert_eq!(rv.unwrap(), "Na Na Na Batman!");
//! ```
//!
//! The same name can be registered with different numbers of parameters.
//! The overload that fits the number of arguments is picked at render time.
//! See [`filters`] for details.
//!
//! # Custom Tags and Operators
//!
//! Tags are added with [`Environment::add_tag`] and
//! [`Environment::add_block_tag`], see [`tags`].  Operators for `if`,
//! `unless` and `case` are added with [`Environment::add_operator`], see
//! [`operators`].
//!
//! # Error Handling
//!
//! Parsing either produces a template or fails with a
//! [`SyntaxError`](ErrorKind::SyntaxError).  Errors during a render are
//! handled according to the [`ErrorMode`]: by default they are written
//! into the output as `Liquid error: ...` and the render continues.  All
//! of them are reported in [`Rendered::diagnostics`] by
//! [`Template::render_with`].  Errors for which
//! [`ErrorKind::is_fatal`] is true abort the render in every mode.
//!
//! # Asynchronous Rendering
//!
//! [`Template::render_async`] renders a template while filters, tags and
//! template sources may suspend.  Nodes are still rendered one after
//! another.  The synchronous [`Template::render`] drives the same code and
//! fails with [`AsyncRequired`](ErrorKind::AsyncRequired) if anything
//! actually suspends.
//!
//! # Optional Features
//!
//! <details><summary><strong style="cursor: pointer">Configurable Features</strong></summary>
//!
//! - `builtins`: the built-in filters.  Without it only `escape` is
//!   registered.
//! - `datetime`: date values and the `date` filter (through `time`).
//! - `json`: the `json` filter.
//! - `urlencode`: the `url_encode` and `url_decode` filters.
//! - `speedups`: turns on the `v_htmlescape` dependency for faster HTML
//!   escaping.
//! - `unstable_machinery`: exposes an unstable internal API (no semver
//!   guarantees) to tokenize and parse templates.
//!
//! </details>
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::get_first)]
#![allow(clippy::needless_borrowed_reference)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod context;
mod defaults;
mod environment;
mod error;
mod loader;
mod output;
mod render;
mod template;
mod utils;

pub mod filters;
pub mod operators;
pub mod tags;
pub mod value;

pub use self::compiler::ast::Block;
pub use self::compiler::markup::{Expr, FilterRequest, ParsedMarkup, Segment};
pub use self::context::{Context, Registers};
pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::filters::FilterSet;
pub use self::loader::{MemorySource, TemplateSource};
pub use self::output::Output;
pub use self::tags::CustomTag;
pub use self::template::{RenderOptions, Rendered, Template};
pub use self::utils::{
    BoxFuture, CancellationToken, ErrorMode, FormatProvider, HtmlEscape, NamingConvention,
    SyntaxCompatibility,
};

/// Re-export for convenience.
pub use self::value::Value;

pub use self::macros::__context;

/// This module gives access to the low level machinery.
///
/// This module is only provided by the `unstable_machinery` feature and does not
/// have a stable interface.  It mostly exists for internal testing purposes and
/// for debugging.
#[cfg(feature = "unstable_machinery")]
#[cfg_attr(docsrs, doc(cfg(feature = "unstable_machinery")))]
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::lexer::{tokenize, Tokenizer};
    pub use crate::compiler::markup::{parse_condition, parse_markup, Condition};
    pub use crate::compiler::parser::parse;
    pub use crate::compiler::tokens::{Span, Token};
    pub use crate::template::CompiledTemplate;

    /// Returns a reference to the [`CompiledTemplate`] of a [`Template`](crate::Template).
    pub fn get_compiled_template<'x>(tmpl: &'x crate::Template<'_>) -> &'x CompiledTemplate {
        &tmpl.compiled
    }
}
