//! Custom tag support.
//!
//! The built-in tags cover the language.  Hosts can add their own tags with
//! [`Environment::add_tag`](crate::Environment::add_tag) (leaf tags) and
//! [`Environment::add_block_tag`](crate::Environment::add_block_tag) (tags
//! with a body closed by `end<name>`).
//!
//! A tag is registered with a factory.  The factory is invoked at parse time
//! with the tag name and the raw markup and returns the tag instance that is
//! stored in the template.  At render time the instance is handed the
//! [`Context`], its parsed body (for block tags) and the [`Output`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use miniliquid::{Block, Context, CustomTag, Environment, Error, Output, context};
//!
//! #[derive(Debug)]
//! struct Repeat(usize);
//!
//! impl CustomTag for Repeat {
//!     fn render(
//!         &self,
//!         ctx: &mut Context<'_>,
//!         body: Option<&Block>,
//!         out: &mut Output,
//!     ) -> Result<(), Error> {
//!         if let Some(body) = body {
//!             for _ in 0..self.0 {
//!                 body.render(ctx, out)?;
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut env = Environment::new();
//! env.add_block_tag("repeat", |_name, markup| {
//!     let count = markup.trim().parse().unwrap_or(1);
//!     Ok(Arc::new(Repeat(count)))
//! });
//! let rv = env.render_str("{% repeat 3 %}x{% endrepeat %}", context!{}).unwrap();
//! assert_eq!(rv, "xxx");
//! ```
//!
//! Tags that need to wait on something override
//! [`render_async`](CustomTag::render_async).  Such tags can only be
//! rendered with [`Template::render_async`](crate::Template::render_async)
//! if they actually suspend.
use std::fmt;
use std::sync::Arc;

use crate::compiler::ast::Block;
use crate::context::Context;
use crate::error::Error;
use crate::output::Output;
use crate::utils::BoxFuture;

/// A tag provided by the host.
pub trait CustomTag: fmt::Debug + Send + Sync {
    /// Renders the tag.
    ///
    /// `body` is the parsed body for tags registered with
    /// [`add_block_tag`](crate::Environment::add_block_tag).
    fn render(
        &self,
        ctx: &mut Context<'_>,
        body: Option<&Block>,
        out: &mut Output,
    ) -> Result<(), Error>;

    /// Renders the tag in an asynchronous render.
    ///
    /// The default implementation calls [`render`](Self::render).
    fn render_async<'a>(
        &'a self,
        ctx: &'a mut Context<'_>,
        body: Option<&'a Block>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let rv = self.render(ctx, body, out);
        Box::pin(async move { rv })
    }
}

pub(crate) type TagFactory =
    dyn Fn(&str, &str) -> Result<Arc<dyn CustomTag>, Error> + Send + Sync + 'static;

/// A registered custom tag.
#[derive(Clone)]
pub(crate) struct TagRegistration {
    pub factory: Arc<TagFactory>,
    /// The name of the closing tag for block tags.
    pub end_tag: Option<String>,
}

impl fmt::Debug for TagRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistration")
            .field("end_tag", &self.end_tag)
            .finish()
    }
}
