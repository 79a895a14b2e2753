use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::compiler::markup::{Condition, Expr, ParsedMarkup};
use crate::compiler::tokens::Span;
use crate::tags::CustomTag;

/// Container for nodes with location info.
///
/// Boxes the node which keeps the [`Node`] enum small.
pub struct Spanned<T> {
    inner: Box<(T, Span)>,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            inner: Box::new((node, span)),
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.inner.1
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(fmt::Debug::fmt(&self.inner.0, f));
        write!(f, "{:?}", self.inner.1)
    }
}

/// A node in the template tree.
#[derive(Debug)]
pub enum Node {
    /// Text that is emitted verbatim.
    Literal(String),
    /// An output expression (`{{ ... }}`).
    Variable(Spanned<ParsedMarkup>),
    /// A tag (`{% ... %}`), possibly owning nested blocks.
    Tag(Spanned<Tag>),
}

/// An ordered list of sibling nodes.
///
/// The root of a template is a block as is the body of every block tag.
#[derive(Debug, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    /// Returns the nodes of this block.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// A parsed tag.
#[derive(Debug)]
pub struct Tag {
    /// The tag name as written.
    pub name: String,
    /// The raw markup following the tag name.
    pub markup: String,
    /// What the tag does.
    pub kind: TagKind,
}

/// The closed set of built-in tags plus the custom tag extension point.
#[derive(Debug)]
pub enum TagKind {
    Assign {
        target: String,
        value: ParsedMarkup,
    },
    Capture {
        target: String,
        body: Block,
    },
    Case {
        subject: Expr,
        whens: Vec<(Vec<Expr>, Block)>,
        else_body: Option<Block>,
    },
    Comment,
    Cycle {
        group: Option<Expr>,
        values: Vec<Expr>,
    },
    Increment(String),
    Decrement(String),
    For(ForLoop),
    Break,
    Continue,
    /// `if` and `unless`.  For `unless` the first condition is negated.
    If {
        negated: bool,
        branches: Vec<(Condition, Block)>,
        else_body: Option<Block>,
    },
    IfChanged(Block),
    Include(Include),
    TableRow(TableRow),
    Custom {
        tag: Arc<dyn CustomTag>,
        body: Option<Block>,
    },
}

/// The `offset:` argument of a `for` loop.
#[derive(Debug)]
pub enum ForOffset {
    Expr(Expr),
    /// Resume where the last loop over the same collection stopped.
    Continue,
}

#[derive(Debug)]
pub struct ForLoop {
    pub var: String,
    pub iter: Expr,
    /// Identifies the loop for `offset:continue` bookkeeping.
    pub name: String,
    pub reversed: bool,
    pub limit: Option<Expr>,
    pub offset: Option<ForOffset>,
    pub body: Block,
    pub else_body: Option<Block>,
}

#[derive(Debug)]
pub struct TableRow {
    pub var: String,
    pub iter: Expr,
    pub name: String,
    pub cols: Option<Expr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub body: Block,
}

/// How an included template receives its primary variable.
#[derive(Debug)]
pub enum IncludeBinding {
    /// `with expr` binds the value to the template's name.
    With(Expr),
    /// `for expr` renders the template once per item.
    For(Expr),
}

#[derive(Debug)]
pub struct Include {
    pub template: Expr,
    pub binding: Option<IncludeBinding>,
    pub attributes: Vec<(String, Expr)>,
}
