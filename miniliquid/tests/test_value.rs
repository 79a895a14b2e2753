use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use miniliquid::value::{Object, Value, ValueKind};
use miniliquid::{context, Context, Environment, NamingConvention, RenderOptions};
use similar_asserts::assert_eq;

#[derive(Serialize)]
struct Product {
    title: String,
    price: f64,
    tags: Vec<&'static str>,
    vendor: Option<String>,
}

#[test]
fn test_serialize_structs() {
    let product = Product {
        title: "Hat".into(),
        price: 9.5,
        tags: vec!["wool", "winter"],
        vendor: None,
    };
    let env = Environment::new();
    let rv = env
        .render_str(
            "{{ product.title }} {{ product.price }} {{ product.tags | join: '/' }} [{{ product.vendor }}]",
            context!(product),
        )
        .unwrap();
    assert_eq!(rv, "Hat 9.5 wool/winter []");

    let value = Value::from_serialize(&product);
    assert_eq!(value.kind(), ValueKind::Map);
    assert_eq!(value.get_key("title").unwrap().as_str(), Some("Hat"));
    assert!(value.get_key("vendor").unwrap().is_nil());
}

#[test]
fn test_values_serialize_back() {
    let product = Product {
        title: "Hat".into(),
        price: 9.5,
        tags: vec!["wool"],
        vendor: None,
    };
    let value = Value::from_serialize(&product);
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"title":"Hat","price":9.5,"tags":["wool"],"vendor":null}"#
    );
    assert_eq!(
        serde_json::to_string(&Value::from_object(Shelf(vec!["a", "b"]))).unwrap(),
        r#"["a","b"]"#
    );
}

#[test]
fn test_output_formatting() {
    let env = Environment::new();
    let ctx = context!(
        whole => 3.0,
        list => vec![1, 2, 3],
        map => context!(a => 1, b => "x", c => ()),
        yes => true,
    );
    assert_eq!(
        env.render_str("{{ whole }}|{{ list }}|{{ map }}|{{ yes }}|{{ nil }}", &ctx)
            .unwrap(),
        "3.0|123|{\"a\"=>1, \"b\"=>\"x\", \"c\"=>nil}|true|"
    );
    assert_eq!(env.render_str("{{ (1..3) }}", &ctx).unwrap(), "1..3");
}

#[test]
fn test_merge_contexts() {
    let defaults = context!(greeting => "Hello", name => "World");
    let ctx = context!(name => "Peter", ..defaults);
    let env = Environment::new();
    assert_eq!(
        env.render_str("{{ greeting }} {{ name }}", ctx).unwrap(),
        "Hello Peter"
    );
}

/// A drop that computes members on access.
#[derive(Debug)]
struct Money {
    cents: i64,
}

impl Object for Money {
    fn get_member(&self, name: &str, _ctx: &Context<'_>) -> Option<Value> {
        match name {
            "cents" => Some(Value::from(self.cents)),
            "amount" => Some(Value::from(self.cents as f64 / 100.0)),
            "is_free" => Some(Value::from(self.cents == 0)),
            _ => None,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.cents / 100, self.cents % 100)
    }
}

#[test]
fn test_object_members() {
    let env = Environment::new();
    let ctx = context!(price => Value::from_object(Money { cents: 1250 }));
    assert_eq!(
        env.render_str(
            "{{ price }} {{ price.cents }} {{ price.amount }} {{ price['cents'] }}",
            &ctx
        )
        .unwrap(),
        "$12.50 1250 12.5 1250"
    );
    assert_eq!(
        env.render_str("{% if price.is_free %}free{% else %}paid{% endif %}", &ctx)
            .unwrap(),
        "paid"
    );

    let tmpl = env.template_from_str("[{{ price.currency }}]").unwrap();
    let rv = tmpl.render_with(&ctx, RenderOptions::new()).unwrap();
    assert_eq!(rv.output, "[]");
    assert_eq!(rv.diagnostics.len(), 1);
    assert_eq!(rv.diagnostics[0].subject(), Some("price.currency"));
}

/// Counts how often its member was resolved.
#[derive(Debug, Default)]
struct Counter {
    hits: AtomicUsize,
}

impl Object for Counter {
    fn get_member(&self, name: &str, _ctx: &Context<'_>) -> Option<Value> {
        match name {
            "next" => Some(Value::from(self.hits.fetch_add(1, Ordering::Relaxed) + 1)),
            _ => None,
        }
    }
}

#[test]
fn test_objects_are_late_bound() {
    let env = Environment::new();
    let ctx = context!(counter => Value::from_object(Counter::default()));
    assert_eq!(
        env.render_str("{{ counter.next }} {{ counter.next }} {{ counter.next }}", &ctx)
            .unwrap(),
        "1 2 3"
    );
}

#[test]
fn test_each_reference_reads_a_member_once() {
    let counter = Arc::new(Counter::default());
    let env = Environment::new();
    let ctx = context!(counter => Value::from_dyn_object(counter.clone()));
    assert_eq!(
        env.render_str(
            "{% if counter.next == 1 %}{{ counter.next | plus: 0 }}{% endif %}",
            &ctx
        )
        .unwrap(),
        "2"
    );
    assert_eq!(counter.hits.load(Ordering::Relaxed), 2);
}

/// Reads a variable from the active render.
#[derive(Debug)]
struct Greeter;

impl Object for Greeter {
    fn get_member(&self, name: &str, ctx: &Context<'_>) -> Option<Value> {
        match name {
            "greeting" => {
                let who = ctx.lookup("who").unwrap_or_else(|| Value::from("nobody"));
                Some(Value::from(format!("Hello {who}")))
            }
            _ => None,
        }
    }
}

#[test]
fn test_objects_see_the_context() {
    let env = Environment::new();
    let ctx = context!(greeter => Value::from_object(Greeter));
    assert_eq!(
        env.render_str(
            "{{ greeter.greeting }}|{% assign who = 'Ann' %}{{ greeter.greeting }}",
            &ctx
        )
        .unwrap(),
        "Hello nobody|Hello Ann"
    );
}

/// A collection drop.
#[derive(Debug)]
struct Shelf(Vec<&'static str>);

impl Object for Shelf {
    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(self.0.iter().copied().map(Value::from).collect())
    }

    fn is_truthy(&self) -> bool {
        !self.0.is_empty()
    }
}

#[test]
fn test_enumerable_objects() {
    let env = Environment::new();
    let full = context!(shelf => Value::from_object(Shelf(vec!["a", "b"])));
    let empty = context!(shelf => Value::from_object(Shelf(vec![])));
    let source = "{% if shelf %}{% for item in shelf %}{{ item }}{% endfor %}/{{ shelf.size }}{% else %}empty{% endif %}";
    assert_eq!(env.render_str(source, &full).unwrap(), "ab/2");
    assert_eq!(env.render_str(source, &empty).unwrap(), "empty");
    assert_eq!(
        env.render_str("{{ shelf | join: ',' }}|{{ shelf | first }}", &full)
            .unwrap(),
        "a,b|a"
    );
}

#[test]
fn test_member_naming_convention() {
    let mut env = Environment::new();
    let ctx = context!(user => context!(Name => "Ann"));
    assert_eq!(env.render_str("[{{ user.name }}]", &ctx).unwrap(), "[]");
    env.set_naming_convention(NamingConvention::CSharp);
    assert_eq!(env.render_str("[{{ user.name }}]", &ctx).unwrap(), "[Ann]");
    assert_eq!(env.render_str("[{{ user.Name }}]", &ctx).unwrap(), "[Ann]");
}

#[test]
#[cfg(feature = "datetime")]
fn test_datetime_values() {
    use time::macros::datetime;

    let env = Environment::new();
    let ctx = context!(posted => Value::from(datetime!(2024-03-05 14:07:09 UTC)));
    assert_eq!(
        env.render_str("{{ posted }}|{{ posted | date: '%d.%m.%Y' }}", &ctx)
            .unwrap(),
        "2024-03-05 14:07:09 +0000|05.03.2024"
    );
    assert_eq!(
        env.render_str(
            "{% if posted > earlier %}later{% endif %}",
            context!(posted => Value::from(datetime!(2024-03-05 0:00 UTC)),
                     earlier => Value::from(datetime!(2023-01-01 0:00 UTC)))
        )
        .unwrap(),
        "later"
    );
}
