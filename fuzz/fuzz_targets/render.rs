#![no_main]
use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde::Serialize;

#[derive(Debug, Serialize, Arbitrary)]
enum Value {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

fuzz_target!(|data: (&str, Vec<(&str, &str)>, Value)| {
    let (root, includes, value) = data;

    let source = miniliquid::MemorySource::new();
    for (name, data) in includes {
        source.add(name, data);
    }

    let mut env = miniliquid::Environment::new();
    env.set_template_source(source);
    env.set_max_render_depth(20);

    let tmpl = match env.template_from_str(root) {
        Ok(tmpl) => tmpl,
        Err(_) => return,
    };
    tmpl.render(&value).ok();
});
