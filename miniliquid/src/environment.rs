use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use memo_map::MemoMap;
use serde::Serialize;

use crate::compiler::ast::Block;
use crate::compiler::markup::ParsedMarkup;
use crate::compiler::parser::parse;
use crate::context::Context;
use crate::defaults;
use crate::error::Error;
use crate::filters::{AsyncFilter, Filter, FilterSet};
use crate::loader::TemplateSource;
use crate::operators::{self, OperatorSet};
use crate::tags::{CustomTag, TagRegistration};
use crate::template::{CompiledTemplate, Template};
use crate::utils::{ErrorMode, FormatProvider, NamingConvention, SyntaxCompatibility};
use crate::value::{FunctionArgs, FunctionResult, Value, ValueMap};

type VariableFactory = dyn Fn(ParsedMarkup) -> Result<ParsedMarkup, Error> + Send + Sync;

/// The default maximum render depth.
const DEFAULT_MAX_RENDER_DEPTH: usize = 100;
/// The default maximum number of terms in a condition.
const DEFAULT_MAX_CONDITION_TERMS: usize = 50;

/// An abstraction that holds the engine configuration.
///
/// The environment is the registry of filters, operators and custom tags and
/// holds the engine settings.  Templates are parsed against an environment
/// and render with it.  It is typically created once and shared.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with the
///   built-in filters and operators.
/// * [`Environment::empty`] creates an environment without filters.  The
///   operators are always available.
///
/// Registering filters, operators or tags requires mutable access.  Once
/// the environment is shared between threads it is read only.
#[derive(Clone)]
pub struct Environment {
    filters: FilterSet,
    operators: OperatorSet,
    tags: BTreeMap<String, TagRegistration>,
    globals: ValueMap,
    variable_factory: Option<Arc<VariableFactory>>,
    naming_convention: NamingConvention,
    syntax_compatibility: SyntaxCompatibility,
    error_mode: ErrorMode,
    strict_variables: bool,
    max_render_depth: usize,
    max_condition_terms: usize,
    template_source: Option<Arc<dyn TemplateSource>>,
    format_provider: Option<Arc<dyn FormatProvider>>,
    templates: MemoMap<String, Arc<CompiledTemplate>>,
    include_cache: MemoMap<String, Arc<Block>>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .field("filters", &self.filters)
            .field("operators", &self.operators)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("naming_convention", &self.naming_convention)
            .field("syntax_compatibility", &self.syntax_compatibility)
            .field("error_mode", &self.error_mode)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with the built-in filters.
    pub fn new() -> Environment {
        Environment {
            filters: defaults::get_builtin_filters(),
            ..Environment::empty()
        }
    }

    /// Creates an environment without filters.
    pub fn empty() -> Environment {
        Environment {
            filters: FilterSet::new(),
            operators: operators::get_builtin_operators(),
            tags: BTreeMap::new(),
            globals: ValueMap::new(),
            variable_factory: None,
            naming_convention: NamingConvention::default(),
            syntax_compatibility: SyntaxCompatibility::default(),
            error_mode: ErrorMode::default(),
            strict_variables: false,
            max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
            max_condition_terms: DEFAULT_MAX_CONDITION_TERMS,
            template_source: None,
            format_provider: None,
            templates: MemoMap::new(),
            include_cache: MemoMap::new(),
        }
    }

    /// Parses a template from a string.
    ///
    /// The name of the template is `<string>`.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// let env = Environment::new();
    /// let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
    /// assert_eq!(tmpl.render(context! { name => "World" }).unwrap(), "Hello World!");
    /// ```
    pub fn template_from_str(&self, source: &str) -> Result<Template<'_>, Error> {
        self.template_from_named_str("<string>", source)
    }

    /// Parses a template from a string with a name.
    ///
    /// The name shows up in errors.
    pub fn template_from_named_str(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Template<'_>, Error> {
        let compiled = ok!(CompiledTemplate::new(name, source, self));
        Ok(Template::new(self, Arc::new(compiled)))
    }

    /// Fetches a template by name from the template source.
    ///
    /// Templates are parsed once and cached by their resolved path.  Fails
    /// with [`TemplateNotFound`](crate::ErrorKind::TemplateNotFound) if no
    /// source is configured or the source does not know the template.
    ///
    /// ```
    /// # use miniliquid::{Environment, MemorySource, context};
    /// let source = MemorySource::new();
    /// source.add("hello.txt", "Hello {{ name }}!");
    /// let mut env = Environment::new();
    /// env.set_template_source(source);
    /// let tmpl = env.get_template("hello.txt").unwrap();
    /// assert_eq!(tmpl.render(context!{ name => "World" }).unwrap(), "Hello World!");
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        let source = match self.template_source {
            Some(ref source) => source,
            None => return Err(Error::new_not_found(name)),
        };
        let path = ok!(source.resolve_full_path(name));
        let compiled = ok!(self.templates.get_or_try_insert(&path, || {
            log::debug!("loading template {name:?} from {path:?}");
            let ctx = Context::new(self, Value::UNDEFINED);
            let text = ok!(source.read_template_text(&ctx, name));
            CompiledTemplate::new(name, &text, self).map(Arc::new)
        }));
        Ok(Template::new(self, compiled.clone()))
    }

    /// Drops all cached templates.
    ///
    /// This covers templates returned by [`get_template`](Self::get_template)
    /// and templates parsed for `include`.
    pub fn clear_cache(&mut self) {
        self.templates.clear();
        self.include_cache.clear();
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// let env = Environment::new();
    /// let rv = env.render_str("Hello {{ name }}", context! { name => "World" });
    /// assert_eq!(rv.unwrap(), "Hello World");
    /// ```
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        let tmpl = ok!(self.template_from_str(source));
        tmpl.render(ctx)
    }

    /// Adds a new filter.
    ///
    /// Registering a name again with the same parameter shape replaces the
    /// filter, a different shape adds an overload.  For details about
    /// filters have a look at [`filters`](crate::filters).
    pub fn add_filter<F, Rv, Args>(&mut self, name: &str, f: F)
    where
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.filters.add(name, f);
    }

    /// Adds a new asynchronous filter.
    ///
    /// ```
    /// # use miniliquid::Environment;
    /// let mut env = Environment::new();
    /// env.add_async_filter("shout", |value: String| async move {
    ///     value.to_uppercase()
    /// });
    /// ```
    pub fn add_async_filter<F, Rv, Args>(&mut self, name: &str, f: F)
    where
        F: AsyncFilter<Rv, Args>,
        Args: for<'a> FunctionArgs<'a, Output = Args> + 'static,
    {
        self.filters.add_async(name, f);
    }

    /// Removes all overloads of a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    pub(crate) fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Adds or replaces a condition operator.
    ///
    /// See [`operators`](crate::operators) for the built-in operators.
    pub fn add_operator<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.operators
            .insert(name, Arc::new(move |a: &Value, b: &Value, _| f(a, b)));
    }

    /// Removes an operator.
    pub fn remove_operator(&mut self, name: &str) {
        self.operators.remove(name);
    }

    pub(crate) fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    /// Registers a custom leaf tag.
    ///
    /// The factory is called at parse time with the tag name and markup.
    /// See [`tags`](crate::tags).
    pub fn add_tag<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str, &str) -> Result<Arc<dyn CustomTag>, Error> + Send + Sync + 'static,
    {
        self.tags.insert(
            name.to_string(),
            TagRegistration {
                factory: Arc::new(factory),
                end_tag: None,
            },
        );
    }

    /// Registers a custom block tag closed by `end<name>`.
    pub fn add_block_tag<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str, &str) -> Result<Arc<dyn CustomTag>, Error> + Send + Sync + 'static,
    {
        self.tags.insert(
            name.to_string(),
            TagRegistration {
                factory: Arc::new(factory),
                end_tag: Some(format!("end{name}")),
            },
        );
    }

    pub(crate) fn get_custom_tag(&self, name: &str) -> Option<&TagRegistration> {
        self.tags.get(name)
    }

    /// Adds a global variable.
    ///
    /// Globals are visible to every template and are shadowed by render
    /// variables.
    pub fn add_global<N, V>(&mut self, name: N, value: V)
    where
        N: Into<String>,
        V: Into<Value>,
    {
        let name: String = name.into();
        self.globals.insert(Arc::from(name), value.into());
    }

    /// Removes a global variable.
    pub fn remove_global(&mut self, name: &str) {
        self.globals.shift_remove(name);
    }

    pub(crate) fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Installs a hook that is invoked for every parsed output expression.
    ///
    /// The hook can rewrite or reject the parsed markup.  Parsing itself is
    /// not changed.
    ///
    /// ```
    /// # use miniliquid::{Environment, Error, ErrorKind};
    /// let mut env = Environment::new();
    /// env.set_variable_factory(|markup| {
    ///     if markup.name.starts_with("secret") {
    ///         return Err(Error::new(ErrorKind::SyntaxError, "secrets cannot be printed"));
    ///     }
    ///     Ok(markup)
    /// });
    /// assert!(env.template_from_str("{{ secret_key }}").is_err());
    /// ```
    pub fn set_variable_factory<F>(&mut self, f: F)
    where
        F: Fn(ParsedMarkup) -> Result<ParsedMarkup, Error> + Send + Sync + 'static,
    {
        self.variable_factory = Some(Arc::new(f));
    }

    pub(crate) fn variable_factory(&self) -> Option<&VariableFactory> {
        self.variable_factory.as_deref()
    }

    /// Sets the naming convention for filters, operators and members.
    pub fn set_naming_convention(&mut self, value: NamingConvention) {
        self.naming_convention = value;
    }

    /// Returns the naming convention.
    pub fn naming_convention(&self) -> NamingConvention {
        self.naming_convention
    }

    /// Sets the default syntax compatibility level.
    pub fn set_syntax_compatibility(&mut self, value: SyntaxCompatibility) {
        self.syntax_compatibility = value;
    }

    /// Returns the default syntax compatibility level.
    pub fn syntax_compatibility(&self) -> SyntaxCompatibility {
        self.syntax_compatibility
    }

    /// Sets the default error mode.
    pub fn set_error_mode(&mut self, value: ErrorMode) {
        self.error_mode = value;
    }

    /// Returns the default error mode.
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    /// Enables reporting of every variable miss as error.
    ///
    /// By default a miss in an output expression is recorded in the
    /// diagnostics and renders as empty string, a miss elsewhere is
    /// silently undefined.  With strict variables every miss fails the
    /// expression and is subject to the error mode.
    pub fn set_strict_variables(&mut self, yes: bool) {
        self.strict_variables = yes;
    }

    /// Checks if strict variables are enabled.
    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    /// Sets the maximum depth of nested includes.
    ///
    /// Exceeding it fails the render with
    /// [`RecursionLimit`](crate::ErrorKind::RecursionLimit).  The default is
    /// 100.
    pub fn set_max_render_depth(&mut self, value: usize) {
        self.max_render_depth = value;
    }

    /// Returns the maximum render depth.
    pub fn max_render_depth(&self) -> usize {
        self.max_render_depth
    }

    /// Sets the maximum number of terms in a condition.
    ///
    /// Longer conditions are rejected at parse time.  The default is 50.
    pub fn set_max_condition_terms(&mut self, value: usize) {
        self.max_condition_terms = value;
    }

    /// Returns the maximum number of terms in a condition.
    pub fn max_condition_terms(&self) -> usize {
        self.max_condition_terms
    }

    /// Sets the template source for `include` and
    /// [`get_template`](Self::get_template).
    ///
    /// This also drops all cached templates.
    pub fn set_template_source<S: TemplateSource + 'static>(&mut self, source: S) {
        self.template_source = Some(Arc::new(source));
        self.clear_cache();
    }

    /// Sets the default format provider for numbers and points in time.
    pub fn set_format_provider<P: FormatProvider + 'static>(&mut self, provider: P) {
        self.format_provider = Some(Arc::new(provider));
    }

    pub(crate) fn format_provider(&self) -> Option<Arc<dyn FormatProvider>> {
        self.format_provider.clone()
    }

    /// Loads and caches a template for `include`.
    pub(crate) async fn load_include(
        &self,
        name: &str,
        ctx: &Context<'_>,
    ) -> Result<Arc<Block>, Error> {
        let source = match self.template_source {
            Some(ref source) => source,
            None => return Err(Error::new_not_found(name)),
        };
        let path = ok!(source.resolve_full_path(name));
        if let Some(rv) = self.include_cache.get(&path) {
            log::debug!("include cache hit for {path:?}");
            return Ok(rv.clone());
        }
        log::debug!("include cache miss for {path:?}");
        let text = ok!(source.read_template_text_async(ctx, name).await);
        let block = Arc::new(ok!(parse(&text, name, self)));
        self.include_cache.insert(path, block.clone());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;
    use crate::loader::MemorySource;

    #[test]
    fn test_get_template_is_cached() {
        let source = MemorySource::new();
        source.add("a", "{{ x }}");
        let mut env = Environment::new();
        env.set_template_source(source);
        let a1 = env.get_template("a").unwrap();
        let a2 = env.get_template("a").unwrap();
        assert!(Arc::ptr_eq(&a1.compiled, &a2.compiled));
        let a1_compiled = a1.compiled.clone();
        env.clear_cache();
        let a3 = env.get_template("a").unwrap();
        assert!(!Arc::ptr_eq(&a1_compiled, &a3.compiled));
    }

    #[test]
    fn test_missing_source() {
        let env = Environment::new();
        let err = env.get_template("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_empty_has_no_filters() {
        let env = Environment::empty();
        let err = env.render_str("{{ 'a' | upcase }}", ()).unwrap();
        assert_eq!(err, "Liquid error: unknown filter 'upcase'");
    }
}
