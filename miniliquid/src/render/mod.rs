//! The tree walking renderer.
//!
//! Every node renders into a boxed future and siblings are awaited in
//! document order.  The synchronous render drives the same futures with
//! [`resolve_now`].
use std::fmt::Write;

use crate::compiler::ast::{Block, Node};
use crate::compiler::markup::{Condition, Expr, FilterRequest, ParsedMarkup, Segment};
use crate::compiler::tokens::Span;
use crate::context::Context;
use crate::error::{Error, ErrorKind};
use crate::filters::{invocation_error, select_overload, FilterFunc};
use crate::operators;
use crate::output::Output;
use crate::utils::{resolve_now, BoxFuture, ErrorMode};
use crate::value::ops::{self, Number};
use crate::value::Value;

mod loop_object;
mod tags;

pub(crate) use self::tags::FILE_SYSTEM_REGISTER;

/// What a node asks of its enclosing loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RenderFlow {
    Completed,
    BreakLoop,
    ContinueLoop,
}

impl Block {
    /// Renders the block into the output.
    ///
    /// This is used by [`CustomTag`](crate::CustomTag) implementations to
    /// render their body.  Fails with [`ErrorKind::AsyncRequired`] if a
    /// node in the block suspends.
    pub fn render(&self, ctx: &mut Context<'_>, out: &mut Output) -> Result<(), Error> {
        resolve_now(self.render_async(ctx, out))
    }

    /// Renders the block into the output asynchronously.
    pub fn render_async<'a>(
        &'a self,
        ctx: &'a mut Context<'_>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move { render_block(self, ctx, out).await.map(|_| ()) })
    }
}

/// Renders the nodes of a block in order.
///
/// A `break` or `continue` stops the block and is handed to the caller.
pub(crate) fn render_block<'a>(
    block: &'a Block,
    ctx: &'a mut Context<'_>,
    out: &'a mut Output,
) -> BoxFuture<'a, Result<RenderFlow, Error>> {
    Box::pin(async move {
        for node in block.nodes() {
            ok!(ctx.check_cancelled());
            let flow = ok!(render_node(node, ctx, out).await);
            if flow != RenderFlow::Completed {
                return Ok(flow);
            }
        }
        Ok(RenderFlow::Completed)
    })
}

async fn render_node(
    node: &Node,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    match node {
        Node::Literal(text) => {
            out.push_str(text);
            Ok(RenderFlow::Completed)
        }
        Node::Variable(markup) => {
            if let Err(err) = render_variable(markup, markup.span(), ctx, out).await {
                ok!(report(ctx, out, locate(err, ctx, markup.span())));
            }
            Ok(RenderFlow::Completed)
        }
        Node::Tag(tag) => {
            if ctx.is_tag_disabled(&tag.name) {
                let err = Error::new(
                    ErrorKind::DisabledTag,
                    format!("{} usage is not allowed in this context", tag.name),
                )
                .with_subject(tag.name.as_str());
                ok!(report(ctx, out, locate(err, ctx, tag.span())));
                return Ok(RenderFlow::Completed);
            }
            match tags::render_tag(tag, ctx, out).await {
                Ok(flow) => Ok(flow),
                Err(err) => {
                    ok!(report(ctx, out, locate(err, ctx, tag.span())));
                    Ok(RenderFlow::Completed)
                }
            }
        }
    }
}

async fn render_variable(
    markup: &ParsedMarkup,
    span: Span,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<(), Error> {
    let value = ok!(eval_markup(markup, ctx).await);
    if value.is_undefined() && markup.is_plain_path() && !ctx.strict_variables() {
        let err = locate(undefined_error(&markup.name), ctx, span);
        ctx.record(err);
    }
    out.push_str(&ctx.format_value(&value));
    Ok(())
}

/// Attaches the location of a node unless the error already has one.
fn locate(mut err: Error, ctx: &Context<'_>, span: Span) -> Error {
    if err.name().is_none() {
        err.set_location(ctx.name(), span.start_line as usize);
    }
    err
}

/// Applies the error mode to a failed node.
///
/// Returns the error if the render has to stop.
pub(crate) fn report(ctx: &mut Context<'_>, out: &mut Output, err: Error) -> Result<(), Error> {
    if err.kind().is_fatal() {
        return Err(err);
    }
    match ctx.error_mode() {
        ErrorMode::Rethrow => return Err(err),
        ErrorMode::Display => {
            out.push_str("Liquid error: ");
            out.push_str(&err.message());
        }
        ErrorMode::Suppress => {}
    }
    ctx.record(err);
    Ok(())
}

fn undefined_error(name: &str) -> Error {
    Error::new(
        ErrorKind::UndefinedError,
        format!("variable '{name}' not found"),
    )
    .with_subject(name)
}

fn path_name(segments: &[Segment]) -> String {
    let mut rv = String::new();
    for segment in segments {
        match segment {
            Segment::Member(name) => {
                if !rv.is_empty() {
                    rv.push('.');
                }
                rv.push_str(name);
            }
            Segment::Index(Expr::Literal(value)) => {
                write!(rv, "[{value:?}]").ok();
            }
            Segment::Index(_) => rv.push_str("[...]"),
        }
    }
    rv
}

/// Evaluates a markup: the primary followed by its filter pipeline.
pub(crate) fn eval_markup<'a>(
    markup: &'a ParsedMarkup,
    ctx: &'a Context<'_>,
) -> BoxFuture<'a, Result<Value, Error>> {
    Box::pin(async move {
        let mut value = ok!(eval_expr(&markup.expr, ctx).await);
        for filter in &markup.filters {
            value = ok!(apply_filter(filter, value, ctx).await);
        }
        Ok(value)
    })
}

/// Evaluates an expression.
///
/// Misses produce undefined unless strict variables are enabled.
pub(crate) fn eval_expr<'a>(
    expr: &'a Expr,
    ctx: &'a Context<'_>,
) -> BoxFuture<'a, Result<Value, Error>> {
    Box::pin(async move {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(segments) => resolve_path(segments, ctx).await,
            Expr::Range(start, end) => {
                let start = ok!(range_bound(&ok!(eval_expr(start, ctx).await)));
                let end = ok!(range_bound(&ok!(eval_expr(end, ctx).await)));
                Ok(Value::from_range(start, end))
            }
            Expr::Filtered(markup) => eval_markup(markup, ctx).await,
        }
    })
}

async fn resolve_path(segments: &[Segment], ctx: &Context<'_>) -> Result<Value, Error> {
    let mut rv = Value::UNDEFINED;
    for (idx, segment) in segments.iter().enumerate() {
        let next = match segment {
            Segment::Member(name) if idx == 0 => ctx.lookup(name),
            Segment::Member(name) => ctx.get_member(&rv, name),
            Segment::Index(expr) => {
                let key = ok!(eval_expr(expr, ctx).await);
                if idx == 0 {
                    key.as_str().and_then(|name| ctx.lookup(name))
                } else {
                    ctx.get_item(&rv, &key)
                }
            }
        };
        match next {
            Some(value) => rv = value,
            None if ctx.strict_variables() => return Err(undefined_error(&path_name(segments))),
            None => return Ok(Value::UNDEFINED),
        }
    }
    Ok(rv)
}

fn range_bound(value: &Value) -> Result<i64, Error> {
    match ops::to_number(value) {
        Some(Number::Int(val)) => Ok(val),
        Some(Number::Float(val)) => Ok(val as i64),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid range bound {:?}", value.to_string()),
        )),
    }
}

/// Looks up and invokes a filter.
///
/// Filters passed for the render take precedence over the ones of the
/// environment.  Arguments are evaluated right before the call.
async fn apply_filter(
    request: &FilterRequest,
    value: Value,
    ctx: &Context<'_>,
) -> Result<Value, Error> {
    let name = request.name.as_str();
    let convention = ctx.naming_convention();
    let overloads = match ctx
        .local_filters()
        .lookup(name, convention)
        .or_else(|| ctx.env().filters().lookup(name, convention))
    {
        Some(overloads) => overloads,
        None => {
            return Err(
                Error::new(ErrorKind::UnknownFilter, format!("unknown filter '{name}'"))
                    .with_subject(name),
            )
        }
    };
    let filter = ok!(select_overload(name, overloads, request.args.len() + 1)).clone();

    let mut args = Vec::with_capacity(request.args.len() + 1);
    args.push(value);
    for arg in &request.args {
        args.push(ok!(eval_expr(arg, ctx).await));
    }

    let rv = match filter.func {
        FilterFunc::Sync(ref f) => f(ctx, &args),
        FilterFunc::Async(ref f) => match f(&args) {
            Ok(fut) => fut.await,
            Err(err) => Err(err),
        },
    };
    rv.map_err(|err| invocation_error(name, err))
}

/// Evaluates a condition.  `and` and `or` short circuit.
pub(crate) fn eval_condition<'a>(
    condition: &'a Condition,
    ctx: &'a Context<'_>,
) -> BoxFuture<'a, Result<bool, Error>> {
    Box::pin(async move {
        match condition {
            Condition::Truthy(expr) => Ok(ok!(eval_expr(expr, ctx).await).is_truthy()),
            Condition::Compare { left, op, right } => {
                let left = ok!(eval_expr(left, ctx).await);
                let right = ok!(eval_expr(right, ctx).await);
                operators::apply(
                    ctx.env().operators(),
                    ctx.naming_convention(),
                    ctx.syntax_compatibility(),
                    op,
                    &left,
                    &right,
                )
            }
            Condition::And(left, right) => {
                Ok(ok!(eval_condition(left, ctx).await) && ok!(eval_condition(right, ctx).await))
            }
            Condition::Or(left, right) => {
                Ok(ok!(eval_condition(left, ctx).await) || ok!(eval_condition(right, ctx).await))
            }
        }
    })
}
