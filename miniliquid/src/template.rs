use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::compiler::ast::Block;
use crate::compiler::parser::parse;
use crate::context::{Context, Registers};
use crate::environment::Environment;
use crate::error::Error;
use crate::filters::{Filter, FilterSet};
use crate::loader::TemplateSource;
use crate::output::Output;
use crate::render::{render_block, FILE_SYSTEM_REGISTER};
use crate::utils::{
    resolve_now, CancellationToken, ErrorMode, FormatProvider, SyntaxCompatibility,
};
use crate::value::{FunctionArgs, FunctionResult, Value, ValueMap};

/// A parsed template together with its instance state.
pub struct CompiledTemplate {
    name: String,
    source: String,
    root: Block,
    assigns: Mutex<ValueMap>,
    thread_safe: AtomicBool,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("thread_safe", &self.thread_safe.load(Ordering::Relaxed))
            .finish()
    }
}

impl CompiledTemplate {
    /// Parses a template.
    pub fn new(name: &str, source: &str, env: &Environment) -> Result<CompiledTemplate, Error> {
        log::debug!("parsing template {name:?}");
        let root = ok!(parse(source, name, env));
        Ok(CompiledTemplate {
            name: name.to_string(),
            source: source.to_string(),
            root,
            assigns: Mutex::new(ValueMap::new()),
            thread_safe: AtomicBool::new(false),
        })
    }

    fn assigns(&self) -> ValueMap {
        self.assigns
            .lock()
            .unwrap_or_else(|x| x.into_inner())
            .clone()
    }

    fn store_assigns(&self, assigns: ValueMap) {
        *self.assigns.lock().unwrap_or_else(|x| x.into_inner()) = assigns;
    }
}

/// The result of [`Template::render_with`].
#[derive(Debug)]
pub struct Rendered {
    /// The rendered text.
    pub output: String,
    /// The errors of the render in the order they happened.
    ///
    /// This includes errors that were also written into the output.
    pub diagnostics: Vec<Error>,
}

/// Per render settings.
///
/// Everything not set here falls back to the configuration of the
/// [`Environment`].
///
/// ```
/// # use miniliquid::{Environment, ErrorMode, RenderOptions, context};
/// let env = Environment::new();
/// let tmpl = env.template_from_str("{{ 'a' | unknown }}!").unwrap();
/// let rv = tmpl.render_with(context!{}, RenderOptions::new().error_mode(ErrorMode::Suppress)).unwrap();
/// assert_eq!(rv.output, "!");
/// assert_eq!(rv.diagnostics.len(), 1);
/// ```
#[derive(Default)]
pub struct RenderOptions {
    format_provider: Option<Arc<dyn FormatProvider>>,
    filters: FilterSet,
    syntax_compatibility: Option<SyntaxCompatibility>,
    error_mode: Option<ErrorMode>,
    strict_variables: Option<bool>,
    disabled_tags: Vec<String>,
    registers: Registers,
    cancellation_token: Option<CancellationToken>,
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("filters", &self.filters)
            .field("syntax_compatibility", &self.syntax_compatibility)
            .field("error_mode", &self.error_mode)
            .field("strict_variables", &self.strict_variables)
            .field("disabled_tags", &self.disabled_tags)
            .field("registers", &self.registers)
            .finish()
    }
}

impl RenderOptions {
    /// Creates options that keep the environment's configuration.
    pub fn new() -> RenderOptions {
        RenderOptions::default()
    }

    /// Formats numbers and points in time with this provider.
    pub fn format_provider<P: FormatProvider + 'static>(mut self, provider: P) -> Self {
        self.format_provider = Some(Arc::new(provider));
        self
    }

    /// Adds a filter that is only visible to this render.
    ///
    /// Filters added here take precedence over the ones of the environment.
    pub fn filter<F, Rv, Args>(mut self, name: &str, f: F) -> Self
    where
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.filters.add(name, f);
        self
    }

    /// Adds a set of filters that is only visible to this render.
    pub fn filters(mut self, filters: &FilterSet) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Overrides the syntax compatibility level.
    pub fn syntax_compatibility(mut self, value: SyntaxCompatibility) -> Self {
        self.syntax_compatibility = Some(value);
        self
    }

    /// Overrides the error mode.
    pub fn error_mode(mut self, value: ErrorMode) -> Self {
        self.error_mode = Some(value);
        self
    }

    /// Overrides strict variables.
    pub fn strict_variables(mut self, yes: bool) -> Self {
        self.strict_variables = Some(yes);
        self
    }

    /// Disables tags by name for this render.
    ///
    /// Disabled tags still parse.  Rendering one produces an error and its
    /// body is skipped.
    pub fn disable_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Puts a value into the registers of the render.
    pub fn register<T: std::any::Any + Send + Sync>(mut self, key: &str, value: T) -> Self {
        self.registers.insert(key, value);
        self
    }

    /// Puts all entries of a register set into the registers of the render.
    pub fn registers(mut self, registers: Registers) -> Self {
        self.registers.extend(registers);
        self
    }

    /// Resolves `include` through this source instead of the environment's.
    ///
    /// Templates loaded this way are not cached.
    pub fn template_source<S: TemplateSource + 'static>(self, source: S) -> Self {
        let source: Arc<dyn TemplateSource> = Arc::new(source);
        self.register(FILE_SYSTEM_REGISTER, source)
    }

    /// Observes a cancellation token between nodes.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    fn apply(self, ctx: &mut Context<'_>) {
        if let Some(provider) = self.format_provider {
            ctx.set_format_provider(provider);
        }
        if !self.filters.is_empty() {
            ctx.add_local_filters(&self.filters);
        }
        if let Some(value) = self.syntax_compatibility {
            ctx.set_syntax_compatibility(value);
        }
        if let Some(value) = self.error_mode {
            ctx.set_error_mode(value);
        }
        if let Some(value) = self.strict_variables {
            ctx.set_strict_variables(value);
        }
        ctx.disable_tags(self.disabled_tags);
        ctx.registers_mut().extend(self.registers);
        if let Some(token) = self.cancellation_token {
            ctx.set_cancellation_token(token);
        }
    }
}

/// Represents a handle to a parsed template.
///
/// Templates are created with [`Environment::template_from_str`] or fetched
/// with [`Environment::get_template`].  The handle is cheap to clone and
/// clones share the instance state.
///
/// Variables assigned during a render are written back into the template
/// and are visible to the next render of it.  Call
/// [`make_thread_safe`](Self::make_thread_safe) to discard them instead.
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment,
    pub(crate) compiled: Arc<CompiledTemplate>,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name())
            .field("thread_safe", &self.is_thread_safe())
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(env: &'env Environment, compiled: Arc<CompiledTemplate>) -> Template<'env> {
        Template { env, compiled }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the variables of the render.  It
    /// needs to be serializable and is typically a map or created with the
    /// [`context!`](crate::context!) macro.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// # let env = Environment::new();
    /// let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
    /// println!("{}", tmpl.render(context!(name => "John")).unwrap());
    /// ```
    ///
    /// Errors that do not abort the render are handled according to the
    /// error mode.  Use [`render_with`](Self::render_with) to get at them.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        self.render_with(ctx, RenderOptions::default())
            .map(|rv| rv.output)
    }

    /// Renders the template with options and returns the diagnostics.
    ///
    /// Fails with [`AsyncRequired`](crate::ErrorKind::AsyncRequired) if a
    /// filter, tag or template source suspends.
    pub fn render_with<S: Serialize>(
        &self,
        ctx: S,
        options: RenderOptions,
    ) -> Result<Rendered, Error> {
        resolve_now(self.render_value(Value::from_serialize(&ctx), options))
    }

    /// Renders the template asynchronously.
    ///
    /// Nodes are rendered one after another in document order.
    pub fn render_async<S: Serialize>(
        &self,
        ctx: S,
    ) -> impl Future<Output = Result<String, Error>> + Send + '_ {
        let fut = self.render_async_with(ctx, RenderOptions::default());
        async move { fut.await.map(|rv| rv.output) }
    }

    /// Renders the template asynchronously with options.
    pub fn render_async_with<S: Serialize>(
        &self,
        ctx: S,
        options: RenderOptions,
    ) -> impl Future<Output = Result<Rendered, Error>> + Send + '_ {
        self.render_value(Value::from_serialize(&ctx), options)
    }

    async fn render_value(&self, vars: Value, options: RenderOptions) -> Result<Rendered, Error> {
        let mut ctx = Context::new(self.env, vars);
        ctx.set_name(self.name());
        options.apply(&mut ctx);
        let thread_safe = self.is_thread_safe();
        if !thread_safe {
            ctx.set_environments(self.compiled.assigns());
        }

        let mut out = Output::new();
        if let Err(err) = render_block(&self.compiled.root, &mut ctx, &mut out).await {
            log::warn!("render of {:?} aborted: {}", self.name(), err);
            return Err(err);
        }

        if !thread_safe {
            self.compiled.store_assigns(ctx.environments().clone());
        }
        let diagnostics = ctx.take_diagnostics();
        if !diagnostics.is_empty() {
            log::debug!(
                "render of {:?} finished with {} diagnostics",
                self.name(),
                diagnostics.len()
            );
        }
        Ok(Rendered {
            output: out.into_string(),
            diagnostics,
        })
    }

    /// Discards variables assigned during a render from now on.
    ///
    /// Renders of a thread safe template do not observe each other.
    pub fn make_thread_safe(&self) {
        self.compiled.thread_safe.store(true, Ordering::Relaxed);
    }

    /// Checks if the template is in thread safe mode.
    pub fn is_thread_safe(&self) -> bool {
        self.compiled.thread_safe.load(Ordering::Relaxed)
    }

    /// Returns the variables assigned by previous renders.
    pub fn instance_assigns(&self) -> ValueMap {
        self.compiled.assigns()
    }

    /// Returns the root block of the parsed template.
    #[cfg(feature = "unstable_machinery")]
    pub fn root(&self) -> &Block {
        &self.compiled.root
    }
}
