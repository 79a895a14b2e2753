use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::filters::FilterSet;
use crate::utils::{
    CancellationToken, ErrorMode, FormatProvider, NamingConvention, SyntaxCompatibility,
};
use crate::value::{Value, ValueKind, ValueMap, ValueRepr};

/// A side channel for state that is shared between tags of one render.
///
/// Registers are keyed by subsystem name and are not part of the variable
/// namespace.  They survive scope changes.  The built-in tags keep their
/// state here (`cycle`, `for`, `ifchanged`) and a host can hand in its own
/// entries through [`RenderOptions::register`](crate::RenderOptions::register).
///
/// A [`TemplateSource`](crate::TemplateSource) stored under the
/// `file_system` key as `Arc<dyn TemplateSource>` takes precedence over the
/// environment's source for `include`.
#[derive(Default)]
pub struct Registers {
    entries: BTreeMap<String, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Registers {
    /// Creates an empty register set.
    pub fn new() -> Registers {
        Registers::default()
    }

    /// Stores a value under a key, replacing what was there.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.entries.insert(key.to_string(), Box::new(value));
    }

    /// Returns the value for a key if it has the requested type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|x| x.downcast_ref())
    }

    /// Returns the value for a key mutably if it has the requested type.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|x| x.downcast_mut())
    }

    /// Removes and returns a value if it has the requested type.
    ///
    /// Values of another type stay in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.entries.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(rv) => Some(*rv),
            Err(other) => {
                self.entries.insert(key.to_string(), other);
                None
            }
        }
    }

    /// Checks if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes a key.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Moves all entries of another register set into this one.
    pub fn extend(&mut self, other: Registers) {
        self.entries.extend(other.entries);
    }
}

/// The runtime state of a render.
///
/// A context holds the stack of variable scopes, the assigned variables
/// ("environments"), the [`Registers`] and the per render policies.  It is
/// handed to filters that ask for it and to [`Object`](crate::value::Object)
/// member lookups.
///
/// Name lookups walk the scopes from the innermost outwards, then the
/// assigned variables, the variables passed to the render and finally the
/// environment's globals.
pub struct Context<'env> {
    env: &'env Environment,
    name: String,
    scopes: Vec<ValueMap>,
    environments: ValueMap,
    globals: Value,
    registers: Registers,
    syntax_compatibility: SyntaxCompatibility,
    error_mode: ErrorMode,
    strict_variables: bool,
    disabled_tags: BTreeSet<String>,
    format_provider: Option<Arc<dyn FormatProvider>>,
    filters: FilterSet,
    depth: usize,
    loops: usize,
    diagnostics: Vec<Error>,
    cancellation: Option<CancellationToken>,
}

impl<'env> fmt::Debug for Context<'env> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("environments", &self.environments)
            .field("globals", &self.globals)
            .field("registers", &self.registers)
            .field("disabled_tags", &self.disabled_tags)
            .field("depth", &self.depth)
            .finish()
    }
}

impl<'env> Context<'env> {
    /// Creates a fresh context for a render.
    pub fn new(env: &'env Environment, globals: Value) -> Context<'env> {
        Context {
            env,
            name: String::new(),
            scopes: vec![ValueMap::new()],
            environments: ValueMap::new(),
            globals,
            registers: Registers::new(),
            syntax_compatibility: env.syntax_compatibility(),
            error_mode: env.error_mode(),
            strict_variables: env.strict_variables(),
            disabled_tags: BTreeSet::new(),
            format_provider: env.format_provider(),
            filters: FilterSet::new(),
            depth: 0,
            loops: 0,
            diagnostics: Vec::new(),
            cancellation: None,
        }
    }

    /// Returns the environment.
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Returns the name of the template being rendered.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) -> String {
        std::mem::replace(&mut self.name, name.to_string())
    }

    pub(crate) fn restore_name(&mut self, name: String) {
        self.name = name;
    }

    /// Looks up a variable by name.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(rv) = scope.get(name) {
                return Some(rv.clone());
            }
        }
        if let Some(rv) = self.environments.get(name) {
            return Some(rv.clone());
        }
        if let Some(rv) = self.get_member(&self.globals, name) {
            return Some(rv);
        }
        self.env.get_global(name)
    }

    /// Resolves a member of a value.
    ///
    /// Maps resolve their keys, objects their members.  `size` is supported
    /// on strings, sequences and maps (unless the map has a `size` key) and
    /// `first` and `last` on sequences.  Members of maps and objects also
    /// match according to the [`NamingConvention`].
    pub fn get_member(&self, value: &Value, name: &str) -> Option<Value> {
        let convention = self.naming_convention();
        match value.0 {
            ValueRepr::Map(ref map) => {
                if let Some(rv) = map.get(name) {
                    return Some(rv.clone());
                }
                if convention == NamingConvention::CSharp {
                    if let Some((_, rv)) = map.iter().find(|(k, _)| convention.matches(k, name)) {
                        return Some(rv.clone());
                    }
                }
                match name {
                    "size" => value.len().map(Value::from),
                    _ => None,
                }
            }
            ValueRepr::Object(ref obj) => {
                if let Some(rv) = obj.get_member(name, self) {
                    return Some(rv);
                }
                structural_member(value, name)
            }
            _ => structural_member(value, name),
        }
    }

    /// Resolves `value[key]`.
    ///
    /// Integer keys index sequences (negative indexes count from the end),
    /// everything else is resolved as member.  Out of range indexes produce
    /// `None`.
    pub fn get_item(&self, value: &Value, key: &Value) -> Option<Value> {
        match key.kind() {
            ValueKind::Number if value.kind() != ValueKind::Map => {
                value.get_index(some!(key.as_i64()))
            }
            ValueKind::String => self.get_member(value, some!(key.as_str())),
            _ if value.kind() == ValueKind::Map => value.get_key(&key.to_string()),
            _ => None,
        }
    }

    /// Pushes a new innermost scope.
    pub fn push(&mut self, frame: ValueMap) {
        log::trace!("push scope (depth {})", self.scopes.len() + 1);
        self.scopes.push(frame);
    }

    /// Pops the innermost scope.
    ///
    /// The root scope cannot be popped, trying to do so is a scoping error.
    pub fn pop(&mut self) -> Result<ValueMap, Error> {
        if self.scopes.len() <= 1 {
            return Err(Error::new(
                ErrorKind::ScopingError,
                "pop without matching push",
            ));
        }
        log::trace!("pop scope (depth {})", self.scopes.len());
        Ok(self.scopes.pop().unwrap_or_default())
    }

    /// Merges variables into the innermost scope.
    pub fn merge_into_innermost(&mut self, values: ValueMap) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.extend(values);
        }
    }

    /// Sets a variable in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(Arc::from(name), value);
        }
    }

    /// Assigns a variable.
    ///
    /// Assigned variables are visible from every scope and outlive the scope
    /// they were assigned in.
    pub fn assign(&mut self, name: &str, value: Value) {
        self.environments.insert(Arc::from(name), value);
    }

    /// Returns the number of scopes including the root scope.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn environments(&self) -> &ValueMap {
        &self.environments
    }

    pub(crate) fn set_environments(&mut self, environments: ValueMap) {
        self.environments = environments;
    }

    /// Gives access to the registers.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Gives mutable access to the registers.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Returns the active syntax compatibility level.
    pub fn syntax_compatibility(&self) -> SyntaxCompatibility {
        self.syntax_compatibility
    }

    pub(crate) fn set_syntax_compatibility(&mut self, value: SyntaxCompatibility) {
        self.syntax_compatibility = value;
    }

    /// Returns the naming convention of the environment.
    pub fn naming_convention(&self) -> NamingConvention {
        self.env.naming_convention()
    }

    /// Returns the active error mode.
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub(crate) fn set_error_mode(&mut self, value: ErrorMode) {
        self.error_mode = value;
    }

    /// Checks if variable misses are reported everywhere.
    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    pub(crate) fn set_strict_variables(&mut self, value: bool) {
        self.strict_variables = value;
    }

    /// Disables tags for the rest of the render.
    pub fn disable_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_tags.extend(tags.into_iter().map(Into::into));
    }

    /// Enables a previously disabled tag.
    pub fn enable_tag(&mut self, tag: &str) {
        self.disabled_tags.remove(tag);
    }

    /// Checks if a tag is disabled.
    pub fn is_tag_disabled(&self, tag: &str) -> bool {
        self.disabled_tags.contains(tag)
    }

    pub(crate) fn set_format_provider(&mut self, provider: Arc<dyn FormatProvider>) {
        self.format_provider = Some(provider);
    }

    /// Converts a value to its output representation.
    ///
    /// Numbers and points in time go through the format provider if one is
    /// configured.
    pub fn format_value(&self, value: &Value) -> String {
        if let Some(ref provider) = self.format_provider {
            let formatted = match value.kind() {
                ValueKind::Number => provider.format_number(value),
                ValueKind::DateTime => provider.format_datetime(value),
                _ => None,
            };
            if let Some(rv) = formatted {
                return rv;
            }
        }
        value.to_string()
    }

    pub(crate) fn local_filters(&self) -> &FilterSet {
        &self.filters
    }

    pub(crate) fn add_local_filters(&mut self, filters: &FilterSet) {
        self.filters.extend(filters);
    }

    pub(crate) fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancellation = Some(token);
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Error> {
        match self.cancellation {
            Some(ref token) if token.is_cancelled() => {
                Err(Error::new(ErrorKind::Cancelled, "the render was cancelled"))
            }
            _ => Ok(()),
        }
    }

    /// Increases the render depth.
    ///
    /// Fails once the maximum depth of the environment is exceeded, in
    /// which case the depth stays unchanged.
    pub(crate) fn enter(&mut self) -> Result<(), Error> {
        if self.depth >= self.env.max_render_depth() {
            return Err(Error::new(
                ErrorKind::RecursionLimit,
                format!(
                    "nesting exceeded the maximum depth of {}",
                    self.env.max_render_depth()
                ),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn enter_loop(&mut self) {
        self.loops += 1;
    }

    pub(crate) fn leave_loop(&mut self) {
        self.loops = self.loops.saturating_sub(1);
    }

    /// Checks if `break` and `continue` have a loop to act on.
    pub(crate) fn in_loop(&self) -> bool {
        self.loops > 0
    }

    /// Returns the errors recorded so far.
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    pub(crate) fn record(&mut self, err: Error) {
        self.diagnostics.push(err);
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.diagnostics)
    }
}

fn structural_member(value: &Value, name: &str) -> Option<Value> {
    match name {
        "size" => value.len().map(Value::from),
        "first" if value.kind() == ValueKind::Seq => value.get_index(0),
        "last" if value.kind() == ValueKind::Seq => value.get_index(-1),
        "first" | "last" if value.kind() == ValueKind::Object => {
            value.get_index(if name == "first" { 0 } else { -1 })
        }
        _ => None,
    }
}
