use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Errors are produced both at parse time (always [`ErrorKind::SyntaxError`])
/// and at render time.  Render time errors are collected into the diagnostics
/// of a render and, depending on the [`ErrorMode`](crate::ErrorMode), are
/// either suppressed, displayed inline or returned.
///
/// # Example
///
/// Here is an example of how you might want to render errors:
///
/// ```rust
/// # let env = miniliquid::Environment::new();
/// # let template = env.template_from_str("").unwrap(); let ctx = ();
/// match template.render(ctx) {
///     Ok(result) => println!("{}", result),
///     Err(err) => {
///         eprintln!("Could not render template:");
///         eprintln!("  {}", err);
///     }
/// }
/// ```
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    subject: Option<String>,
    name: Option<String>,
    lineno: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .field("subject", &self.subject)
            .field("name", &self.name)
            .field("lineno", &self.lineno)
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The template has a syntax error.
    SyntaxError,
    /// A variable was not found.
    UndefinedError,
    /// A condition used an operator that is not registered.
    UnknownOperator,
    /// A filter is unknown.
    UnknownFilter,
    /// A filter failed while it was invoked.
    FilterInvocation,
    /// An argument could not be converted to the expected type.
    InvalidArguments,
    /// A required argument was not supplied.
    MissingArgument,
    /// More arguments were supplied than accepted.
    TooManyArguments,
    /// A tag was used that is disabled for this render.
    DisabledTag,
    /// The maximum render depth was exceeded.
    RecursionLimit,
    /// A scope was popped that was never pushed.
    ScopingError,
    /// A template was not found.
    TemplateNotFound,
    /// An operation on a value was not possible.
    InvalidOperation,
    /// A value could not be converted into the engine's data model.
    BadSerialization,
    /// The render was cancelled.
    Cancelled,
    /// The synchronous render hit a step that suspended.
    AsyncRequired,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::UndefinedError => "variable not found",
            ErrorKind::UnknownOperator => "unknown operator",
            ErrorKind::UnknownFilter => "unknown filter",
            ErrorKind::FilterInvocation => "filter invocation failed",
            ErrorKind::InvalidArguments => "invalid arguments",
            ErrorKind::MissingArgument => "missing argument",
            ErrorKind::TooManyArguments => "too many arguments",
            ErrorKind::DisabledTag => "tag not allowed",
            ErrorKind::RecursionLimit => "stack level too deep",
            ErrorKind::ScopingError => "scoping error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::BadSerialization => "could not serialize to internal format",
            ErrorKind::Cancelled => "render cancelled",
            ErrorKind::AsyncRequired => "asynchronous render required",
        }
    }

    /// Fatal errors abort a render regardless of the error mode.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::RecursionLimit
                | ErrorKind::ScopingError
                | ErrorKind::Cancelled
                | ErrorKind::AsyncRequired
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            write!(f, "{}: {}", self.kind, detail)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if let Some(ref filename) = self.name {
            write!(f, " (in {}:{})", filename, self.lineno)?
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            subject: None,
            name: None,
            lineno: 0,
            source: None,
        }
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
        .with_subject(name)
    }

    pub(crate) fn set_location(&mut self, filename: &str, lineno: usize) {
        self.name = Some(filename.into());
        self.lineno = lineno;
    }

    /// Attaches the name of the offending tag, filter or variable.
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the name of the offending tag, filter or variable.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the filename.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line.
    pub fn line(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.lineno)
    }

    /// The short human readable message used for inline error output.
    pub fn message(&self) -> Cow<'_, str> {
        match self.detail {
            Some(ref detail) => Cow::Borrowed(detail),
            None => Cow::Borrowed(self.kind.description()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            subject: None,
            name: None,
            lineno: 0,
            source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::InvalidOperation, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
