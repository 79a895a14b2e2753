use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use miniliquid::{context, Environment, Error, ErrorKind, MemorySource, RenderOptions};
use similar_asserts::assert_eq;

fn create_env() -> Environment {
    let source = MemorySource::new();
    source.add("greeting", "Hello {{ greeting }}!");
    source.add("product", "[{{ product.title }}]");
    source.add("card", "{{ title }}/{{ price | default: 'free' }}");
    source.add("snippets/item", "<{{ item }}>");
    source.add("nested", "({% include 'greeting' %})");
    source.add("broken", "{% if x %}");
    source.add("loop", "x{% include 'loop' %}");
    let mut env = Environment::new();
    env.set_template_source(source);
    env
}

#[test]
fn test_include_with() {
    let env = create_env();
    assert_eq!(
        env.render_str("{% include 'greeting' with 'World' %}", context!())
            .unwrap(),
        "Hello World!"
    );
    assert_eq!(
        env.render_str(
            "{% include 'product' with featured %}",
            context!(featured => context!(title => "Hat"))
        )
        .unwrap(),
        "[Hat]"
    );
}

#[test]
fn test_include_binds_variable_of_same_name() {
    let env = create_env();
    assert_eq!(
        env.render_str(
            "{% include 'product' %}",
            context!(product => context!(title => "Shirt"))
        )
        .unwrap(),
        "[Shirt]"
    );
    assert_eq!(
        env.render_str("{% include 'snippets/item' %}", context!(item => 1))
            .unwrap(),
        "<1>"
    );
}

#[test]
fn test_include_for() {
    let env = create_env();
    let ctx = context!(items => vec!["a", "b", "c"]);
    assert_eq!(
        env.render_str("{% include 'snippets/item' for items %}", &ctx)
            .unwrap(),
        "<a><b><c>"
    );
    assert_eq!(
        env.render_str("{% include 'snippets/item' for 'single' %}", &ctx)
            .unwrap(),
        "<single>"
    );
}

#[test]
fn test_include_attributes() {
    let env = create_env();
    assert_eq!(
        env.render_str("{% include 'card', title: 'Hat', price: 5 %}", context!())
            .unwrap(),
        "Hat/5"
    );
    assert_eq!(
        env.render_str(
            "{% include 'card' title: name %}|{{ title }}",
            context!(name => "Cap")
        )
        .unwrap(),
        "Cap/free|"
    );
}

#[test]
fn test_include_dynamic_name() {
    let env = create_env();
    assert_eq!(
        env.render_str(
            "{% include snippet with 'x' %}",
            context!(snippet => "greeting")
        )
        .unwrap(),
        "Hello x!"
    );
}

#[test]
fn test_nested_include() {
    let env = create_env();
    assert_eq!(
        env.render_str("{% include 'nested' %}", context!(greeting => "you"))
            .unwrap(),
        "(Hello you!)"
    );
}

#[test]
fn test_missing_include() {
    let env = create_env();
    let tmpl = env
        .template_from_str("a{% include 'nope' %}b")
        .unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "aLiquid error: template \"nope\" does not existb");
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::TemplateNotFound);

    let env = Environment::new();
    let rv = env
        .render_str("{% include 'nope' %}", context!())
        .unwrap();
    assert_eq!(rv, "Liquid error: template \"nope\" does not exist");
}

#[test]
fn test_include_syntax_error() {
    let env = create_env();
    let tmpl = env.template_from_str("{% include 'broken' %}").unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::SyntaxError);
    assert_eq!(rv.diagnostics[0].name(), Some("broken"));
    assert_eq!(
        rv.output,
        "Liquid error: 'if' tag was never closed, expected 'endif'"
    );
}

#[test]
fn test_recursion_limit() {
    let mut env = create_env();
    env.set_max_render_depth(5);
    let err = env
        .render_str("{% include 'loop' %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
    assert!(err
        .to_string()
        .starts_with("stack level too deep: nesting exceeded the maximum depth of 5"));

    // the limit is fatal regardless of the error mode
    let tmpl = env.template_from_str("{% include 'loop' %}").unwrap();
    let err = tmpl
        .render_with(
            context!(),
            RenderOptions::new().error_mode(miniliquid::ErrorMode::Suppress),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
}

#[test]
fn test_include_depth_within_limit() {
    let source = MemorySource::new();
    source.add("level3", "3");
    source.add("level2", "2{% include 'level3' %}");
    source.add("level1", "1{% include 'level2' %}");
    let mut env = Environment::new();
    env.set_template_source(source);
    env.set_max_render_depth(3);
    assert_eq!(
        env.render_str("{% include 'level1' %}", context!())
            .unwrap(),
        "123"
    );
    env.set_max_render_depth(2);
    let err = env
        .render_str("{% include 'level1' %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
}

#[test]
fn test_closure_source_and_cache() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let mut env = Environment::new();
    env.set_template_source(move |name: &str| -> Result<Option<String>, Error> {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(match name {
            "a" => Some("A{{ a }}".into()),
            _ => None,
        })
    });

    let tmpl = env
        .template_from_str("{% include 'a' %}{% include 'a' %}")
        .unwrap();
    assert_eq!(tmpl.render(context!(a => 1)).unwrap(), "A1A1");
    assert_eq!(tmpl.render(context!(a => 2)).unwrap(), "A2A2");
    assert_eq!(reads.load(Ordering::Relaxed), 1);

    env.clear_cache();
    let tmpl = env.template_from_str("{% include 'a' %}").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "A");
    assert_eq!(reads.load(Ordering::Relaxed), 2);
}

#[test]
fn test_file_system_register_override() {
    let env = create_env();
    let tmpl = env
        .template_from_str("{% include 'greeting' with 'World' %}")
        .unwrap();

    let options = RenderOptions::new().template_source(
        |name: &str| -> Result<Option<String>, Error> {
            Ok(match name {
                "greeting" => Some("Hi {{ greeting }}.".into()),
                _ => None,
            })
        },
    );
    assert_eq!(tmpl.render_with(context!(), options).unwrap().output, "Hi World.");

    // the environment's source and its cache are untouched
    assert_eq!(tmpl.render(context!()).unwrap(), "Hello World!");
}

#[test]
fn test_get_template() {
    let env = create_env();
    let tmpl = env.get_template("greeting").unwrap();
    assert_eq!(tmpl.name(), "greeting");
    assert_eq!(tmpl.source(), "Hello {{ greeting }}!");
    assert_eq!(tmpl.render(context!(greeting => "there")).unwrap(), "Hello there!");

    let err = env.get_template("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);

    let err = env.get_template("broken").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.name(), Some("broken"));
}

#[test]
fn test_errors_in_includes_name_the_include() {
    let env = create_env();
    let tmpl = env
        .template_from_str("{% include 'card', title: 'x', price: 'y' %}")
        .unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "x/y");

    let source = MemorySource::new();
    source.add("bad", "\n{{ 'a' | nope }}");
    let mut env = Environment::new();
    env.set_template_source(source);
    let tmpl = env.template_from_str("{% include 'bad' %}").unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "\nLiquid error: unknown filter 'nope'");
    assert_eq!(rv.diagnostics[0].name(), Some("bad"));
    assert_eq!(rv.diagnostics[0].line(), Some(2));
}
