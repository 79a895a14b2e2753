use std::sync::Arc;

use miniliquid::value::Value;
use miniliquid::{
    context, Block, CancellationToken, Context, CustomTag, Environment, Error, ErrorKind,
    ErrorMode, FilterRequest, FormatProvider, Output, RenderOptions,
};
use similar_asserts::assert_eq;

#[derive(Debug)]
struct Emit(&'static str);

impl CustomTag for Emit {
    fn render(
        &self,
        _ctx: &mut Context<'_>,
        _body: Option<&Block>,
        out: &mut Output,
    ) -> Result<(), Error> {
        out.push_str(self.0);
        Ok(())
    }
}

/// Disables the tags named in its markup for the rest of the render.
#[derive(Debug)]
struct Lock(Vec<String>);

impl CustomTag for Lock {
    fn render(
        &self,
        ctx: &mut Context<'_>,
        _body: Option<&Block>,
        _out: &mut Output,
    ) -> Result<(), Error> {
        ctx.disable_tags(self.0.iter().cloned());
        Ok(())
    }
}

#[derive(Debug)]
struct Repeat(usize);

impl CustomTag for Repeat {
    fn render(
        &self,
        ctx: &mut Context<'_>,
        body: Option<&Block>,
        out: &mut Output,
    ) -> Result<(), Error> {
        if let Some(body) = body {
            for idx in 0..self.0 {
                ctx.push(Default::default());
                ctx.set("repetition", Value::from(idx));
                let rv = body.render(ctx, out);
                ctx.pop()?;
                rv?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CurrentUser;

impl CustomTag for CurrentUser {
    fn render(
        &self,
        ctx: &mut Context<'_>,
        _body: Option<&Block>,
        out: &mut Output,
    ) -> Result<(), Error> {
        match ctx.registers().get::<String>("user") {
            Some(user) => {
                out.push_str(user);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::InvalidOperation, "nobody is logged in")),
        }
    }
}

fn create_env() -> Environment {
    let mut env = Environment::new();
    env.add_tag("x", |_name, _markup| Ok(Arc::new(Emit("X"))));
    env.add_tag("y", |_name, _markup| Ok(Arc::new(Emit("Y"))));
    env.add_tag("lock", |_name, markup| {
        Ok(Arc::new(Lock(
            markup.split_whitespace().map(String::from).collect(),
        )))
    });
    env.add_tag("current_user", |_name, _markup| Ok(Arc::new(CurrentUser)));
    env.add_block_tag("repeat", |_name, markup| {
        let count = markup.trim().parse().map_err(|_| {
            Error::new(
                ErrorKind::SyntaxError,
                format!("repeat expects a count, got {:?}", markup.trim()),
            )
        })?;
        Ok(Arc::new(Repeat(count)))
    });
    env
}

#[test]
fn test_error_modes() {
    let mut env = create_env();
    let source = "a{{ 'x' | nope }}b";

    assert_eq!(
        env.render_str(source, context!()).unwrap(),
        "aLiquid error: unknown filter 'nope'b"
    );

    env.set_error_mode(ErrorMode::Suppress);
    assert_eq!(env.error_mode(), ErrorMode::Suppress);
    let tmpl = env.template_from_str(source).unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "ab");
    assert_eq!(rv.diagnostics.len(), 1);

    let err = tmpl
        .render_with(context!(), RenderOptions::new().error_mode(ErrorMode::Rethrow))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFilter);
    assert_eq!(
        err.to_string(),
        "unknown filter: unknown filter 'nope' (in <string>:1)"
    );
    assert_eq!(err.subject(), Some("nope"));

    env.set_error_mode(ErrorMode::Rethrow);
    let err = env.render_str("ok\n{{ 1 | divided_by: 0 }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FilterInvocation);
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_errors_continue_rendering() {
    let env = create_env();
    let tmpl = env
        .template_from_str("{% current_user %}|{{ 'a' | nope }}|{% x %}")
        .unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(
        rv.output,
        "Liquid error: nobody is logged in|Liquid error: unknown filter 'nope'|X"
    );
    let kinds = rv.diagnostics.iter().map(|x| x.kind()).collect::<Vec<_>>();
    assert_eq!(kinds, vec![ErrorKind::InvalidOperation, ErrorKind::UnknownFilter]);
}

#[test]
fn test_disabled_tags() {
    let env = create_env();
    let tmpl = env.template_from_str("{% x %}{% y %}").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "XY");

    let rv = tmpl
        .render_with(context!(), RenderOptions::new().disable_tags(["x"]))
        .unwrap();
    assert_eq!(rv.output, "Liquid error: x usage is not allowed in this contextY");
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::DisabledTag);
    assert_eq!(rv.diagnostics[0].subject(), Some("x"));
}

#[test]
fn test_disabled_block_tags_skip_their_body() {
    let env = create_env();
    let tmpl = env
        .template_from_str("{% for i in (1..2) %}{{ i }}{% endfor %}|{% repeat 2 %}r{% endrepeat %}")
        .unwrap();
    let rv = tmpl
        .render_with(context!(), RenderOptions::new().disable_tags(["for", "repeat"]))
        .unwrap();
    assert_eq!(
        rv.output,
        "Liquid error: for usage is not allowed in this context|\
         Liquid error: repeat usage is not allowed in this context"
    );
    let rv = tmpl
        .render_with(
            context!(),
            RenderOptions::new()
                .disable_tags(["for"])
                .error_mode(ErrorMode::Suppress),
        )
        .unwrap();
    assert_eq!(rv.output, "|rr");
}

#[test]
fn test_disabled_builtin_tag_leaves_siblings_alone() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{% include 'x' %}{% assign y = 1 %}{{ y }}")
        .unwrap();
    let rv = tmpl
        .render_with(context!(), RenderOptions::new().disable_tags(["include"]))
        .unwrap();
    assert_eq!(
        rv.output,
        "Liquid error: include usage is not allowed in this context1"
    );
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::DisabledTag);
}

#[test]
fn test_disabled_tag_reports_every_iteration() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{% for i in (1..3) %}{{ i }}{% cycle 'a' %}{% endfor %}")
        .unwrap();
    let rv = tmpl
        .render_with(
            context!(),
            RenderOptions::new()
                .disable_tags(["cycle"])
                .error_mode(ErrorMode::Suppress),
        )
        .unwrap();
    assert_eq!(rv.output, "123");
    assert_eq!(rv.diagnostics.len(), 3);
    assert!(rv
        .diagnostics
        .iter()
        .all(|err| err.kind() == ErrorKind::DisabledTag && err.subject() == Some("cycle")));
}

#[test]
fn test_tags_disabled_during_render() {
    let env = create_env();
    let tmpl = env
        .template_from_str("{% x %}{% lock x %}{% x %}{% y %}")
        .unwrap();
    assert_eq!(
        tmpl.render(context!()).unwrap(),
        "XLiquid error: x usage is not allowed in this contextY"
    );
    // the next render starts over
    assert_eq!(
        tmpl.render_with(context!(), RenderOptions::new().error_mode(ErrorMode::Suppress))
            .unwrap()
            .output,
        "XY"
    );
}

#[test]
fn test_custom_block_tag() {
    let env = create_env();
    assert_eq!(
        env.render_str(
            "{% repeat 3 %}[{{ repetition }}]{% endrepeat %}{{ repetition }}",
            context!()
        )
        .unwrap(),
        "[0][1][2]"
    );

    let err = env
        .template_from_str("{% repeat many %}{% endrepeat %}")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(
        err.to_string(),
        "syntax error: repeat expects a count, got \"many\" (in <string>:1)"
    );

    let err = env.template_from_str("{% repeat 2 %}x").unwrap_err();
    assert!(err
        .to_string()
        .contains("'repeat' tag was never closed, expected 'endrepeat'"));
}

#[test]
fn test_registers() {
    let env = create_env();
    let tmpl = env.template_from_str("Hi {% current_user %}!").unwrap();
    let rv = tmpl
        .render_with(
            context!(),
            RenderOptions::new().register("user", String::from("ann")),
        )
        .unwrap();
    assert_eq!(rv.output, "Hi ann!");

    let mut registers = miniliquid::Registers::new();
    registers.insert("user", String::from("bob"));
    let rv = tmpl
        .render_with(context!(), RenderOptions::new().registers(registers))
        .unwrap();
    assert_eq!(rv.output, "Hi bob!");
}

#[test]
fn test_cancellation() {
    let env = create_env();
    let tmpl = env.template_from_str("a{{ 'b' }}c").unwrap();
    let token = CancellationToken::new();
    assert!(tmpl
        .render_with(context!(), RenderOptions::new().cancellation_token(token.clone()))
        .is_ok());

    token.cancel();
    let err = tmpl
        .render_with(context!(), RenderOptions::new().cancellation_token(token))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_cancellation_during_render() {
    let token = CancellationToken::new();
    let mut env = create_env();
    let trigger = token.clone();
    env.add_filter("stop", move |value: Value| {
        trigger.cancel();
        value
    });
    let tmpl = env
        .template_from_str("{% for i in (1..100) %}{{ i | stop }}{% endfor %}")
        .unwrap();
    let err = tmpl
        .render_with(
            context!(),
            RenderOptions::new()
                .cancellation_token(token)
                .error_mode(ErrorMode::Suppress),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_undefined_variables() {
    let env = create_env();
    let tmpl = env
        .template_from_str("[{{ missing }}][{{ user.missing }}][{{ missing | upcase }}]")
        .unwrap();
    let rv = tmpl
        .render_with(context!(user => context!(name => "x")), RenderOptions::new())
        .unwrap();
    assert_eq!(rv.output, "[][][]");
    assert_eq!(rv.diagnostics.len(), 2);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::UndefinedError);
    assert_eq!(
        rv.diagnostics[0].to_string(),
        "variable not found: variable 'missing' not found (in <string>:1)"
    );
    assert_eq!(rv.diagnostics[1].subject(), Some("user.missing"));
}

#[test]
fn test_strict_variables() {
    let mut env = create_env();
    env.set_strict_variables(true);
    let tmpl = env
        .template_from_str("[{{ missing | upcase }}]{% if user.age > 1 %}old{% endif %}[{{ user.name }}]")
        .unwrap();
    let rv = tmpl
        .render_with(context!(user => context!(name => "x")), RenderOptions::new())
        .unwrap();
    assert_eq!(
        rv.output,
        "[Liquid error: variable 'missing' not found]\
         Liquid error: variable 'user.age' not found[x]"
    );
    assert_eq!(rv.diagnostics.len(), 2);

    let rv = tmpl
        .render_with(
            context!(user => context!(name => "x")),
            RenderOptions::new().strict_variables(false),
        )
        .unwrap();
    assert_eq!(rv.output, "[][x]");
    assert!(rv.diagnostics.is_empty());
}

struct DecimalComma;

impl FormatProvider for DecimalComma {
    fn format_number(&self, value: &Value) -> Option<String> {
        let f = value.as_f64()?;
        if f.fract() == 0.0 {
            None
        } else {
            Some(f.to_string().replace('.', ","))
        }
    }
}

struct Brackets;

impl FormatProvider for Brackets {
    fn format_number(&self, value: &Value) -> Option<String> {
        Some(format!("<{value}>"))
    }
}

#[test]
fn test_format_provider() {
    let mut env = create_env();
    let source = "{{ price }}|{{ count }}|{{ label }}";
    let ctx = context!(price => 1.5, count => 2, label => "3.5");
    assert_eq!(env.render_str(source, &ctx).unwrap(), "1.5|2|3.5");

    env.set_format_provider(DecimalComma);
    assert_eq!(env.render_str(source, &ctx).unwrap(), "1,5|2|3.5");

    let tmpl = env.template_from_str(source).unwrap();
    let rv = tmpl
        .render_with(&ctx, RenderOptions::new().format_provider(Brackets))
        .unwrap();
    assert_eq!(rv.output, "<1.5>|<2>|3.5");
}

#[test]
fn test_globals() {
    let mut env = create_env();
    env.add_global("shop", context!(name => "Corner Store"));
    env.add_global("currency", "EUR");
    assert_eq!(
        env.render_str("{{ shop.name }} ({{ currency }})", context!())
            .unwrap(),
        "Corner Store (EUR)"
    );
    assert_eq!(
        env.render_str("{{ currency }}", context!(currency => "USD"))
            .unwrap(),
        "USD"
    );
    assert_eq!(
        env.render_str("{% assign currency = 'CHF' %}{{ currency }}", context!())
            .unwrap(),
        "CHF"
    );
    env.remove_global("currency");
    assert_eq!(env.render_str("[{{ currency }}]", context!()).unwrap(), "[]");
}

#[test]
fn test_variable_factory() {
    let mut env = create_env();
    env.set_variable_factory(|mut markup| {
        if markup.name.starts_with("secret") {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                format!("{} cannot be printed", markup.name),
            ));
        }
        if !markup.filters.iter().any(|x| x.name == "raw") {
            markup.filters.push(FilterRequest {
                name: "escape".into(),
                arguments: Vec::new(),
                args: Vec::new(),
            });
        } else {
            markup.filters.retain(|x| x.name != "raw");
        }
        Ok(markup)
    });

    assert_eq!(
        env.render_str("{{ html }}|{{ html | raw }}", context!(html => "<b>"))
            .unwrap(),
        "&lt;b&gt;|<b>"
    );

    let err = env.template_from_str("\n\n{{ secret_key }}").unwrap_err();
    assert_eq!(
        err.to_string(),
        "syntax error: secret_key cannot be printed (in <string>:3)"
    );
}

#[test]
fn test_settings_roundtrip() {
    let mut env = Environment::new();
    assert_eq!(env.max_render_depth(), 100);
    assert_eq!(env.max_condition_terms(), 50);
    assert!(!env.strict_variables());
    assert_eq!(env.error_mode(), ErrorMode::Display);
    env.set_max_render_depth(10);
    env.set_max_condition_terms(5);
    assert_eq!(env.max_render_depth(), 10);
    assert_eq!(env.max_condition_terms(), 5);
}

#[test]
fn test_fatal_kinds() {
    assert!(ErrorKind::RecursionLimit.is_fatal());
    assert!(ErrorKind::Cancelled.is_fatal());
    assert!(ErrorKind::AsyncRequired.is_fatal());
    assert!(!ErrorKind::UnknownFilter.is_fatal());
    assert!(!ErrorKind::DisabledTag.is_fatal());
}
