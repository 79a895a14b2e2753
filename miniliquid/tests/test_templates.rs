use std::collections::BTreeMap;

use miniliquid::{context, Environment, ErrorKind, RenderOptions};

use similar_asserts::assert_eq;

fn render(source: &str, ctx: miniliquid::Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

#[test]
fn test_literal_text_roundtrips() {
    for source in [
        "",
        "Hello World",
        "a { b } c",
        "lonely } and { braces",
        "}} closing without opening",
        "multi\nline\r\ntext\n",
        "{# not closed",
    ] {
        assert_eq!(render(source, context!()), source);
    }
}

#[test]
fn test_variables() {
    let ctx = context! {
        user => context! { name => "Peter", tags => vec!["a", "b", "c"] },
        items => vec![1, 2, 3],
        key => "name",
    };
    assert_eq!(render("{{ user.name }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user['name'] }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user[key] }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ items[0] }}-{{ items[-1] }}", ctx.clone()), "1-3");
    assert_eq!(render("{{ items.first }}{{ items.last }}", ctx.clone()), "13");
    assert_eq!(render("{{ items.size }}", ctx.clone()), "3");
    assert_eq!(render("{{ user.tags.size }}", ctx.clone()), "3");
    assert_eq!(render("{{ user.name.size }}", ctx.clone()), "5");
    assert_eq!(render("{{ items }}", ctx), "123");
}

#[test]
fn test_literals_and_keywords() {
    assert_eq!(render("{{ 'single' }}{{ \"double\" }}", context!()), "singledouble");
    assert_eq!(render("{{ 42 }} {{ -1 }} {{ 1.5 }}", context!()), "42 -1 1.5");
    assert_eq!(render("{{ true }} {{ false }} [{{ nil }}]", context!()), "true false []");
    assert_eq!(render("{{ (1..3) }}", context!()), "1..3");
}

#[test]
fn test_size_key_wins_over_structural_size() {
    let ctx = context! { parcel => context! { size => "large" } };
    assert_eq!(render("{{ parcel.size }}", ctx), "large");
}

#[test]
fn test_missing_variable_diagnostics() {
    let env = Environment::new();
    let tmpl = env.template_from_str("{{ missing }}").unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "");
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].kind(), ErrorKind::UndefinedError);
    assert_eq!(rv.diagnostics[0].subject(), Some("missing"));

    let tmpl = env.template_from_str("{% if missing %}X{% endif %}").unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "");
    assert!(rv.diagnostics.is_empty());

    let tmpl = env.template_from_str("{{ missing.deeper }}").unwrap();
    let rv = tmpl.render_with(context!(), RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "");
    assert_eq!(rv.diagnostics.len(), 1);
}

#[test]
fn test_whitespace_trim() {
    assert_eq!(
        render("a \n{%- if true %}b{% endif -%}\nc", context!()),
        "a b\nc"
    );
    assert_eq!(render("a  {{- 'x' -}}  b", context!()), "axb");
    assert_eq!(render("a\n{{- 'x' }}", context!()), "ax");
    assert_eq!(render("a\n\n{{- 'x' }}", context!()), "a\nx");
}

#[test]
fn test_comments_and_literals() {
    assert_eq!(render("a{# comment #}b", context!()), "ab");
    assert_eq!(render("{{{ {{ not parsed }} }}}", context!()), "{{ not parsed }}");
    assert_eq!(
        render("{% raw %}{{ x }}{% if %}{% endraw %}", context!()),
        "{{ x }}{% if %}"
    );
    assert_eq!(
        render("{% literal %}{% for %}{% endliteral %}", context!()),
        "{% for %}"
    );
    assert_eq!(
        render("a{% comment %}{{ x }}{% if %}{% endcomment %}b", context!()),
        "ab"
    );
}

#[test]
fn test_assign_and_capture() {
    assert_eq!(
        render("{% assign x = 'hello' | upcase %}{{ x }}", context!()),
        "HELLO"
    );
    assert_eq!(
        render(
            "{% capture greeting %}Hello {{ name }}{% endcapture %}{{ greeting }}!",
            context!(name => "World")
        ),
        "Hello World!"
    );
    assert_eq!(
        render(
            "{% for i in (1..2) %}{% assign last = i %}{% endfor %}{{ last }}",
            context!()
        ),
        "2"
    );
}

#[test]
fn test_if_unless() {
    let tmpl = "{% if x > 10 %}big{% elsif x > 5 %}medium{% else %}small{% endif %}";
    assert_eq!(render(tmpl, context!(x => 20)), "big");
    assert_eq!(render(tmpl, context!(x => 7)), "medium");
    assert_eq!(render(tmpl, context!(x => 1)), "small");

    let tmpl = "{% unless x %}no{% elsif y %}y{% else %}x{% endunless %}";
    assert_eq!(render(tmpl, context!(x => false)), "no");
    assert_eq!(render(tmpl, context!(x => true, y => true)), "y");
    assert_eq!(render(tmpl, context!(x => true)), "x");
}

#[test]
fn test_nested_if() {
    let tmpl = "{% if a %}A{% if b %}B{% endif %}{% endif %}";
    assert_eq!(render(tmpl, context!(a => true, b => true)), "AB");
    assert_eq!(render(tmpl, context!(a => true)), "A");
    assert_eq!(render(tmpl, context!(b => true)), "");
}

#[test]
fn test_case() {
    let tmpl = "{% case x %}{% when 1 %}one{% when 2, 3 %}few{% when 'a' or 'b' %}letter{% else %}other{% endcase %}";
    assert_eq!(render(tmpl, context!(x => 1)), "one");
    assert_eq!(render(tmpl, context!(x => 3)), "few");
    assert_eq!(render(tmpl, context!(x => "b")), "letter");
    assert_eq!(render(tmpl, context!(x => 99)), "other");

    let tmpl = "{% case x %}{% when 1 %}a{% when 1 %}b{% endcase %}";
    assert_eq!(render(tmpl, context!(x => 1)), "ab");
}

#[test]
fn test_for() {
    let ctx = context!(items => vec!["a", "b", "c"]);
    assert_eq!(render("{% for x in items %}{{ x }}{% endfor %}", ctx.clone()), "abc");
    assert_eq!(
        render("{% for x in items reversed %}{{ x }}{% endfor %}", ctx.clone()),
        "cba"
    );
    assert_eq!(
        render("{% for x in items limit: 2 %}{{ x }}{% endfor %}", ctx.clone()),
        "ab"
    );
    assert_eq!(
        render("{% for x in items offset: 1 %}{{ x }}{% endfor %}", ctx.clone()),
        "bc"
    );
    assert_eq!(
        render("{% for x in (1..5) limit: 2 offset: 1 %}{{ x }}{% endfor %}", context!()),
        "23"
    );
    assert_eq!(
        render("{% for x in empty_list %}{{ x }}{% else %}none{% endfor %}", context!(empty_list => Vec::<i32>::new())),
        "none"
    );
    assert_eq!(
        render("{% for x in missing %}{{ x }}{% else %}none{% endfor %}", context!()),
        "none"
    );
    assert_eq!(
        render("{% for x in 'abc' %}[{{ x }}]{% endfor %}", context!()),
        "[abc]"
    );
}

#[test]
fn test_for_over_wide_ranges() {
    assert_eq!(
        render(
            "{% for i in (1..9999999999999) offset: 5 limit: 2 %}{{ i }},{% endfor %}",
            context!()
        ),
        "6,7,"
    );
    assert_eq!(
        render(
            "{% tablerow i in (1..9999999999999) limit: 1 %}{{ i }}{% endtablerow %}",
            context!()
        ),
        "<tr class=\"row1\">\n<td class=\"col1\">1</td></tr>\n"
    );
    assert_eq!(
        render(
            "{% assign r = (-9223372036854775808..9223372036854775807) %}{{ r.first }}|{{ r.last }}|{{ r[1] }}",
            context!()
        ),
        "-9223372036854775808|9223372036854775807|-9223372036854775807"
    );
    let env = Environment::new();
    assert!(env
        .render_str("{{ (-9223372036854775808..9223372036854775807) | size }}", context!())
        .is_ok());
}

#[test]
fn test_for_over_map() {
    let mut map = BTreeMap::new();
    map.insert("a", 1);
    map.insert("b", 2);
    assert_eq!(
        render(
            "{% for pair in map %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
            context!(map)
        ),
        "a=1;b=2;"
    );
}

#[test]
fn test_for_offset_continue() {
    let ctx = context!(items => vec![1, 2, 3, 4, 5]);
    assert_eq!(
        render(
            "{% for x in items limit: 2 %}{{ x }}{% endfor %};\
             {% for x in items limit: 2 offset: continue %}{{ x }}{% endfor %};\
             {% for x in items offset: continue %}{{ x }}{% endfor %}",
            ctx
        ),
        "12;34;5"
    );
}

#[test]
fn test_forloop_drop() {
    assert_eq!(
        render(
            "{% for x in (1..3) %}{{ forloop.index }}/{{ forloop.index0 }}/{{ forloop.rindex }}/{{ forloop.rindex0 }}/{{ forloop.length }} {% endfor %}",
            context!()
        ),
        "1/0/3/2/3 2/1/2/1/3 3/2/1/0/3 "
    );
    assert_eq!(
        render(
            "{% for x in (1..3) %}{% if forloop.first %}[{% endif %}{{ x }}{% if forloop.last %}]{% else %},{% endif %}{% endfor %}",
            context!()
        ),
        "[1,2,3]"
    );
    assert_eq!(
        render(
            "{% for a in (1..2) %}{% for b in (1..2) %}{{ forloop.parentloop.index }}{{ forloop.index }} {% endfor %}{% endfor %}",
            context!()
        ),
        "11 12 21 22 "
    );
    assert_eq!(
        render("{% for x in items %}{{ forloop.name }}{% endfor %}", context!(items => vec![1])),
        "x-items"
    );
}

#[test]
fn test_break_continue() {
    assert_eq!(
        render(
            "{% for x in (1..10) %}{% if x == 4 %}{% break %}{% endif %}{{ x }}{% endfor %}",
            context!()
        ),
        "123"
    );
    assert_eq!(
        render(
            "{% for x in (1..5) %}{% if x == 2 %}{% continue %}{% endif %}{{ x }}{% endfor %}",
            context!()
        ),
        "1345"
    );
    assert_eq!(
        render(
            "{% for a in (1..2) %}{% for b in (1..3) %}{% if b == 2 %}{% break %}{% endif %}{{ a }}{{ b }} {% endfor %}{% endfor %}",
            context!()
        ),
        "11 21 "
    );
    assert_eq!(render("a{% break %}b{% continue %}c", context!()), "abc");
}

#[test]
fn test_cycle() {
    assert_eq!(
        render(
            "{% for x in (1..5) %}{% cycle 'a', 'b', 'c' %}{% endfor %}",
            context!()
        ),
        "abcab"
    );
    assert_eq!(
        render(
            "{% cycle 'g1': 'a', 'b' %}{% cycle 'g2': 'a', 'b' %}{% cycle 'g1': 'a', 'b' %}",
            context!()
        ),
        "aab"
    );
}

#[test]
fn test_increment_decrement() {
    assert_eq!(
        render(
            "{% increment x %}{% increment x %}{% increment x %}|{% decrement y %}{% decrement y %}",
            context!()
        ),
        "012|-1-2"
    );
}

#[test]
fn test_ifchanged() {
    assert_eq!(
        render(
            "{% for x in items %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}",
            context!(items => vec![1, 1, 2, 2, 1])
        ),
        "121"
    );
}

#[test]
fn test_tablerow() {
    assert_eq!(
        render(
            "{% tablerow x in (1..3) cols: 2 %}{{ x }}{% endtablerow %}",
            context!()
        ),
        "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n\
         <tr class=\"row2\"><td class=\"col1\">3</td></tr>\n"
    );
    assert_eq!(
        render(
            "{% tablerow x in (1..4) cols: 2 %}{{ tablerowloop.row }}{{ tablerowloop.col }}{% if tablerowloop.col_last %}!{% endif %}{% endtablerow %}",
            context!()
        ),
        "<tr class=\"row1\">\n<td class=\"col1\">11</td><td class=\"col2\">12!</td></tr>\n\
         <tr class=\"row2\"><td class=\"col1\">21</td><td class=\"col2\">22!</td></tr>\n"
    );
}

#[test]
fn test_keywords_empty_blank() {
    let tmpl = "{% if x == empty %}empty{% elsif x == blank %}blank{% else %}full{% endif %}";
    assert_eq!(render(tmpl, context!(x => "")), "empty");
    assert_eq!(render(tmpl, context!(x => Vec::<i32>::new())), "empty");
    assert_eq!(render(tmpl, context!(x => "   ")), "blank");
    assert_eq!(render(tmpl, context!(x => ())), "blank");
    assert_eq!(render(tmpl, context!(x => "a")), "full");
}

#[test]
fn test_instance_assigns_survive_renders() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{{ counter }}{% assign counter = 'set' %}")
        .unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "");
    assert_eq!(tmpl.render(context!()).unwrap(), "set");
    assert_eq!(
        tmpl.instance_assigns().get("counter").and_then(|x| x.as_str()),
        Some("set")
    );
}

#[test]
fn test_thread_safe_mode_isolates_renders() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{{ counter }}{% assign counter = 'set' %}")
        .unwrap();
    tmpl.make_thread_safe();
    assert!(tmpl.is_thread_safe());
    assert_eq!(tmpl.render(context!()).unwrap(), "");
    assert_eq!(tmpl.render(context!()).unwrap(), "");
    assert!(tmpl.instance_assigns().is_empty());
}

#[test]
fn test_thread_safe_template_across_threads() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{% assign doubled = n | times: 2 %}{{ doubled }}")
        .unwrap();
    tmpl.make_thread_safe();
    std::thread::scope(|s| {
        let handles = (0..4)
            .map(|n| {
                let tmpl = &tmpl;
                s.spawn(move || tmpl.render(context!(n)).unwrap())
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results, vec!["0", "2", "4", "6"]);
    });
}

#[test]
fn test_render_macro() {
    assert_eq!(miniliquid::render!("Hello {{ name }}!", name => "World"), "Hello World!");
    let env = Environment::new();
    let name = "Peter";
    assert_eq!(miniliquid::render!(in env, "{{ name | upcase }}", name), "PETER");
}
