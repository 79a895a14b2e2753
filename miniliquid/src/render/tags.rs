use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::ast::{
    Block, ForLoop, ForOffset, Include, IncludeBinding, Spanned, TableRow, Tag, TagKind,
};
use crate::compiler::markup::{Condition, Expr};
use crate::compiler::parser::parse;
use crate::context::Context;
use crate::error::Error;
use crate::loader::TemplateSource;
use crate::operators;
use crate::output::Output;
use crate::render::loop_object::{self, LoopStatus};
use crate::render::{eval_condition, eval_expr, eval_markup, render_block, RenderFlow};
use crate::value::ops::{self, Number};
use crate::value::{Value, ValueKind, ValueMap};

/// The register key for cycle positions.
const CYCLE_REGISTER: &str = "cycle";
/// The register key for `offset: continue` positions.
const FOR_REGISTER: &str = "for";
/// The register key for the last output of `ifchanged`.
const IFCHANGED_REGISTER: &str = "ifchanged";
/// The register key for a template source override.
pub(crate) const FILE_SYSTEM_REGISTER: &str = "file_system";

pub(crate) async fn render_tag(
    tag: &Spanned<Tag>,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    match tag.kind {
        TagKind::Assign {
            ref target,
            ref value,
        } => {
            let value = ok!(eval_markup(value, ctx).await);
            ctx.assign(target, value);
            Ok(RenderFlow::Completed)
        }
        TagKind::Capture {
            ref target,
            ref body,
        } => {
            out.begin_capture();
            let rv = render_block(body, ctx, out).await;
            let captured = out.end_capture();
            let flow = ok!(rv);
            ctx.assign(target, Value::from(captured));
            Ok(flow)
        }
        TagKind::Case {
            ref subject,
            ref whens,
            ref else_body,
        } => render_case(subject, whens, else_body.as_ref(), ctx, out).await,
        TagKind::Comment => Ok(RenderFlow::Completed),
        TagKind::Cycle {
            ref group,
            ref values,
        } => {
            ok!(render_cycle(group.as_ref(), values, ctx, out).await);
            Ok(RenderFlow::Completed)
        }
        TagKind::Increment(ref name) => {
            let current = counter(ctx, name);
            out.push_str(&current.to_string());
            ctx.assign(name, Value::from(current + 1));
            Ok(RenderFlow::Completed)
        }
        TagKind::Decrement(ref name) => {
            let current = counter(ctx, name) - 1;
            out.push_str(&current.to_string());
            ctx.assign(name, Value::from(current));
            Ok(RenderFlow::Completed)
        }
        TagKind::For(ref for_loop) => render_for(for_loop, ctx, out).await,
        TagKind::Break if ctx.in_loop() => Ok(RenderFlow::BreakLoop),
        TagKind::Continue if ctx.in_loop() => Ok(RenderFlow::ContinueLoop),
        TagKind::Break | TagKind::Continue => Ok(RenderFlow::Completed),
        TagKind::If {
            negated,
            ref branches,
            ref else_body,
        } => render_if(negated, branches, else_body.as_ref(), ctx, out).await,
        TagKind::IfChanged(ref body) => {
            out.begin_capture();
            let rv = render_block(body, ctx, out).await;
            let captured = out.end_capture();
            let flow = ok!(rv);
            let last = ctx.registers_mut().take::<String>(IFCHANGED_REGISTER);
            if last.as_deref() != Some(captured.as_str()) {
                out.push_str(&captured);
            }
            ctx.registers_mut().insert(IFCHANGED_REGISTER, captured);
            Ok(flow)
        }
        TagKind::Include(ref include) => render_include(include, ctx, out).await,
        TagKind::TableRow(ref table_row) => render_tablerow(table_row, ctx, out).await,
        TagKind::Custom { ref tag, ref body } => {
            ok!(tag.render_async(ctx, body.as_ref(), out).await);
            Ok(RenderFlow::Completed)
        }
    }
}

fn counter(ctx: &Context<'_>, name: &str) -> i64 {
    ctx.environments()
        .get(name)
        .and_then(|x| x.as_i64())
        .unwrap_or(0)
}

async fn render_if(
    negated: bool,
    branches: &[(Condition, Block)],
    else_body: Option<&Block>,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    for (idx, (condition, body)) in branches.iter().enumerate() {
        let mut rv = ok!(eval_condition(condition, ctx).await);
        if negated && idx == 0 {
            rv = !rv;
        }
        if rv {
            return render_block(body, ctx, out).await;
        }
    }
    match else_body {
        Some(body) => render_block(body, ctx, out).await,
        None => Ok(RenderFlow::Completed),
    }
}

/// Renders every `when` that matches, the `else` body if none does.
async fn render_case(
    subject: &Expr,
    whens: &[(Vec<Expr>, Block)],
    else_body: Option<&Block>,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    let subject = ok!(eval_expr(subject, ctx).await);
    let mut matched = false;
    for (values, body) in whens {
        let mut hit = false;
        for value in values {
            let value = ok!(eval_expr(value, ctx).await);
            if ok!(operators::apply(
                ctx.env().operators(),
                ctx.naming_convention(),
                ctx.syntax_compatibility(),
                "==",
                &value,
                &subject,
            )) {
                hit = true;
                break;
            }
        }
        if hit {
            matched = true;
            let flow = ok!(render_block(body, ctx, out).await);
            if flow != RenderFlow::Completed {
                return Ok(flow);
            }
        }
    }
    match else_body {
        Some(body) if !matched => render_block(body, ctx, out).await,
        _ => Ok(RenderFlow::Completed),
    }
}

async fn render_cycle(
    group: Option<&Expr>,
    values: &[Expr],
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<(), Error> {
    if values.is_empty() {
        return Ok(());
    }
    let key = match group {
        Some(group) => ok!(eval_expr(group, ctx).await).to_string(),
        None => format!("{values:?}"),
    };
    let mut positions = ctx
        .registers_mut()
        .take::<BTreeMap<String, usize>>(CYCLE_REGISTER)
        .unwrap_or_default();
    let position = positions.entry(key).or_insert(0);
    let idx = *position % values.len();
    *position = idx + 1;
    ctx.registers_mut().insert(CYCLE_REGISTER, positions);

    let value = ok!(eval_expr(&values[idx], ctx).await);
    out.push_str(&ctx.format_value(&value));
    Ok(())
}

/// The items a loop walks over.
///
/// Strings are a single item, values that cannot be iterated none.  Only
/// the window selected by `offset` and `limit` is materialized.
fn loop_items(value: &Value, offset: usize, limit: Option<i64>) -> Vec<Value> {
    let limit = limit.map(|x| usize::try_from(x.max(0)).unwrap_or(usize::MAX));
    match value.kind() {
        ValueKind::String if value.as_str() == Some("") || offset > 0 || limit == Some(0) => {
            Vec::new()
        }
        ValueKind::String => vec![value.clone()],
        _ => value.try_iter_window(offset, limit).unwrap_or_default(),
    }
}

/// Evaluates a numeric loop argument.  `nil` counts as not given.
async fn int_arg(expr: Option<&Expr>, ctx: &Context<'_>) -> Result<Option<i64>, Error> {
    let value = match expr {
        Some(expr) => ok!(eval_expr(expr, ctx).await),
        None => return Ok(None),
    };
    if value.is_nil() {
        return Ok(None);
    }
    Ok(match ops::to_number(&value) {
        Some(Number::Int(val)) => Some(val),
        Some(Number::Float(val)) => Some(val as i64),
        None => None,
    })
}

async fn render_for(
    for_loop: &ForLoop,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    let collection = ok!(eval_expr(&for_loop.iter, ctx).await);
    let offset = match for_loop.offset {
        Some(ForOffset::Continue) => ctx
            .registers()
            .get::<BTreeMap<String, usize>>(FOR_REGISTER)
            .and_then(|x| x.get(&for_loop.name))
            .copied()
            .unwrap_or(0),
        Some(ForOffset::Expr(ref expr)) => {
            ok!(int_arg(Some(expr), ctx).await).unwrap_or(0).max(0) as usize
        }
        None => 0,
    };
    let limit = ok!(int_arg(for_loop.limit.as_ref(), ctx).await);
    let mut items = loop_items(&collection, offset, limit);

    let mut positions = ctx
        .registers_mut()
        .take::<BTreeMap<String, usize>>(FOR_REGISTER)
        .unwrap_or_default();
    positions.insert(for_loop.name.clone(), offset.saturating_add(items.len()));
    ctx.registers_mut().insert(FOR_REGISTER, positions);

    if for_loop.reversed {
        items.reverse();
    }

    if items.is_empty() {
        return match for_loop.else_body {
            Some(ref body) => render_block(body, ctx, out).await,
            None => Ok(RenderFlow::Completed),
        };
    }

    let parentloop = ctx.lookup("forloop").unwrap_or_default();
    let status = Arc::new(LoopStatus::new(&for_loop.name, items.len(), parentloop));
    let forloop = Value::from_object(loop_object::ForLoop {
        status: status.clone(),
    });

    ctx.push(ValueMap::new());
    ctx.enter_loop();
    ctx.set("forloop", forloop);
    let mut rv = Ok(RenderFlow::Completed);
    for (idx, item) in items.into_iter().enumerate() {
        status.advance(idx);
        ctx.set(&for_loop.var, item);
        match render_block(&for_loop.body, ctx, out).await {
            Ok(RenderFlow::BreakLoop) => break,
            Ok(_) => {}
            Err(err) => {
                rv = Err(err);
                break;
            }
        }
    }
    ctx.leave_loop();
    ok!(ctx.pop());
    rv
}

async fn render_tablerow(
    table_row: &TableRow,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    let collection = ok!(eval_expr(&table_row.iter, ctx).await);
    let offset = ok!(int_arg(table_row.offset.as_ref(), ctx).await)
        .unwrap_or(0)
        .max(0) as usize;
    let limit = ok!(int_arg(table_row.limit.as_ref(), ctx).await);
    let items = loop_items(&collection, offset, limit);
    let len = items.len();
    let cols = match ok!(int_arg(table_row.cols.as_ref(), ctx).await) {
        Some(cols) if cols > 0 => cols as usize,
        _ => len.max(1),
    };

    let status = Arc::new(LoopStatus::new(&table_row.name, len, Value::UNDEFINED));
    let tablerowloop = Value::from_object(loop_object::TableRowLoop {
        status: status.clone(),
        cols,
    });

    out.push_str("<tr class=\"row1\">\n");
    ctx.push(ValueMap::new());
    ctx.enter_loop();
    ctx.set("tablerowloop", tablerowloop);
    let mut rv = Ok(RenderFlow::Completed);
    for (idx, item) in items.into_iter().enumerate() {
        status.advance(idx);
        ctx.set(&table_row.var, item);
        let col0 = idx % cols;
        out.push_str(&format!("<td class=\"col{}\">", col0 + 1));
        let flow = render_block(&table_row.body, ctx, out).await;
        out.push_str("</td>");
        if col0 + 1 == cols && idx + 1 != len {
            out.push_str(&format!("</tr>\n<tr class=\"row{}\">", idx / cols + 2));
        }
        match flow {
            Ok(RenderFlow::BreakLoop) => break,
            Ok(_) => {}
            Err(err) => {
                rv = Err(err);
                break;
            }
        }
    }
    ctx.leave_loop();
    ok!(ctx.pop());
    out.push_str("</tr>\n");
    rv
}

/// Loads the template for an `include`.
///
/// A source in the `file_system` register wins over the environment's
/// source.  Only templates from the environment's source are cached.
async fn load_include(name: &str, ctx: &Context<'_>) -> Result<Arc<Block>, Error> {
    let source = ctx
        .registers()
        .get::<Arc<dyn TemplateSource>>(FILE_SYSTEM_REGISTER)
        .cloned();
    match source {
        Some(source) => {
            log::debug!("loading include {name:?} from the file_system register");
            let text = ok!(source.read_template_text_async(ctx, name).await);
            parse(&text, name, ctx.env()).map(Arc::new)
        }
        None => ctx.env().load_include(name, ctx).await,
    }
}

async fn render_include(
    include: &Include,
    ctx: &mut Context<'_>,
    out: &mut Output,
) -> Result<RenderFlow, Error> {
    let name = ok!(eval_expr(&include.template, ctx).await).to_string();
    let template = ok!(load_include(&name, ctx).await);
    let var_name = name.rsplit('/').next().unwrap_or(&name).to_string();

    let bound = match include.binding {
        Some(IncludeBinding::With(ref expr)) | Some(IncludeBinding::For(ref expr)) => {
            Some(ok!(eval_expr(expr, ctx).await))
        }
        None => ctx.lookup(&var_name),
    };
    let mut frame = ValueMap::new();
    for (key, expr) in &include.attributes {
        frame.insert(Arc::from(key.as_str()), ok!(eval_expr(expr, ctx).await));
    }

    ok!(ctx.enter());
    ctx.push(frame);
    let old_name = ctx.set_name(&name);
    let rv = match (&include.binding, bound) {
        (Some(IncludeBinding::For(_)), Some(value)) if value.kind() == ValueKind::Seq => {
            let mut rv = Ok(RenderFlow::Completed);
            for item in value.try_iter().unwrap_or_default() {
                ctx.set(&var_name, item);
                rv = render_block(&template, ctx, out).await;
                if !matches!(rv, Ok(RenderFlow::Completed)) {
                    break;
                }
            }
            rv
        }
        (_, Some(value)) => {
            ctx.set(&var_name, value);
            render_block(&template, ctx, out).await
        }
        (_, None) => render_block(&template, ctx, out).await,
    };
    ctx.restore_name(old_name);
    let popped = ctx.pop();
    ctx.leave();
    ok!(popped);
    rv
}
