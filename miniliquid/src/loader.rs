//! Template sources for `include`.
//!
//! The engine does not read templates from anywhere by itself.  A
//! [`TemplateSource`] is configured on the environment with
//! [`set_template_source`](crate::Environment::set_template_source) and
//! consulted by `include` and [`get_template`](crate::Environment::get_template).
//!
//! Closures of the form `Fn(&str) -> Result<Option<String>, Error>` are
//! template sources:
//!
//! ```
//! # use miniliquid::{Environment, Error, context};
//! let mut env = Environment::new();
//! env.set_template_source(|name: &str| -> Result<Option<String>, Error> {
//!     Ok(match name {
//!         "greeting" => Some("Hello {{ greeting }}!".to_string()),
//!         _ => None,
//!     })
//! });
//! let rv = env.render_str("{% include 'greeting' with 'World' %}", context!{}).unwrap();
//! assert_eq!(rv, "Hello World!");
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use crate::context::Context;
use crate::error::Error;
use crate::utils::BoxFuture;

/// The template source collaborator.
///
/// Resolved paths are the keys of the include cache.  Reading happens
/// during a render and gets the active [`Context`].  Sources that need to
/// wait on I/O implement
/// [`read_template_text_async`](Self::read_template_text_async).
pub trait TemplateSource: Send + Sync {
    /// Resolves a template name into a unique path.
    ///
    /// The default returns the name unchanged.
    fn resolve_full_path(&self, name: &str) -> Result<String, Error> {
        Ok(name.to_string())
    }

    /// Returns the source of a template.
    ///
    /// A missing template should fail with
    /// [`ErrorKind::TemplateNotFound`](crate::ErrorKind::TemplateNotFound).
    fn read_template_text(&self, ctx: &Context<'_>, name: &str) -> Result<String, Error>;

    /// Returns the source of a template in an asynchronous render.
    ///
    /// The default implementation calls
    /// [`read_template_text`](Self::read_template_text).
    fn read_template_text_async<'a>(
        &'a self,
        ctx: &'a Context<'_>,
        name: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        let rv = self.read_template_text(ctx, name);
        Box::pin(async move { rv })
    }
}

impl<F> TemplateSource for F
where
    F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync,
{
    fn read_template_text(&self, _ctx: &Context<'_>, name: &str) -> Result<String, Error> {
        match ok!(self(name)) {
            Some(rv) => Ok(rv),
            None => Err(Error::new_not_found(name)),
        }
    }
}

/// A template source that holds templates in memory.
///
/// ```
/// # use miniliquid::{Environment, MemorySource, context};
/// let source = MemorySource::new();
/// source.add("item", "<li>{{ item }}</li>");
/// let mut env = Environment::new();
/// env.set_template_source(source);
/// let rv = env.render_str("{% include 'item' for items %}", context!{ items => [1, 2] }).unwrap();
/// assert_eq!(rv, "<li>1</li><li>2</li>");
/// ```
#[derive(Default)]
pub struct MemorySource {
    templates: RwLock<BTreeMap<String, String>>,
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let templates = self.templates.read().unwrap_or_else(|x| x.into_inner());
        f.debug_set().entries(templates.keys()).finish()
    }
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Adds or replaces a template.
    ///
    /// Templates that were already included are served from the include
    /// cache until [`clear_cache`](crate::Environment::clear_cache) is
    /// called.
    pub fn add<N: Into<String>, S: Into<String>>(&self, name: N, source: S) {
        self.templates
            .write()
            .unwrap_or_else(|x| x.into_inner())
            .insert(name.into(), source.into());
    }

    /// Removes a template.
    pub fn remove(&self, name: &str) {
        self.templates
            .write()
            .unwrap_or_else(|x| x.into_inner())
            .remove(name);
    }
}

impl TemplateSource for MemorySource {
    fn read_template_text(&self, _ctx: &Context<'_>, name: &str) -> Result<String, Error> {
        self.templates
            .read()
            .unwrap_or_else(|x| x.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new_not_found(name))
    }
}
