use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::Serialize;

criterion_main! { benches }

criterion_group! {
    benches,
    bench_compare_compile,
    bench_compare_render,
}

const INDEX_SOURCE: &str = include_str!("../inputs/comparison/template.liquid");
const FOOTER_SOURCE: &str = include_str!("../inputs/comparison/footer.liquid");

#[derive(Serialize, Debug)]
struct NavItem {
    url: &'static str,
    title: &'static str,
    is_active: bool,
}

#[derive(Serialize, Debug)]
struct Site {
    nav: Vec<NavItem>,
    copyright: u32,
}

#[derive(Serialize, Debug)]
struct Context {
    items: Vec<String>,
    site: Site,
    title: &'static str,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            items: vec![
                "<First Item>".into(),
                "<Second Item>".into(),
                "<Third Item>".into(),
                "<Fourth Item>".into(),
                "<Fifth Item>".into(),
                "<Sixth Item>".into(),
            ],
            site: Site {
                nav: vec![
                    NavItem {
                        url: "/",
                        title: "Index",
                        is_active: true,
                    },
                    NavItem {
                        url: "/download",
                        title: "Download",
                        is_active: false,
                    },
                    NavItem {
                        url: "/about",
                        title: "About",
                        is_active: false,
                    },
                    NavItem {
                        url: "/help",
                        title: "Help",
                        is_active: false,
                    },
                ],
                copyright: 2022,
            },
            title: "My Benchmark Site",
        }
    }
}

fn miniliquid_env() -> miniliquid::Environment {
    let source = miniliquid::MemorySource::new();
    source.add("footer.liquid", FOOTER_SOURCE);
    let mut env = miniliquid::Environment::new();
    env.set_template_source(source);
    env
}

fn liquid_parser() -> liquid::Parser {
    type Partials = liquid::partials::EagerCompiler<liquid::partials::InMemorySource>;
    let mut partials = Partials::empty();
    partials.add("footer.liquid", FOOTER_SOURCE);
    liquid::ParserBuilder::with_stdlib()
        .partials(partials)
        .build()
        .unwrap()
}

pub fn bench_compare_compile(c: &mut Criterion) {
    let mut g = c.benchmark_group("cmp_compile");

    g.bench_function("miniliquid", |b| {
        let env = miniliquid_env();
        b.iter(|| {
            env.template_from_str(black_box(INDEX_SOURCE)).unwrap();
            env.template_from_str(black_box(FOOTER_SOURCE)).unwrap();
        });
    });

    g.bench_function("liquid", |b| {
        let parser = liquid_parser();
        b.iter(|| {
            parser.parse(black_box(INDEX_SOURCE)).unwrap();
            parser.parse(black_box(FOOTER_SOURCE)).unwrap();
        });
    });
}

pub fn bench_compare_render(c: &mut Criterion) {
    let mut g = c.benchmark_group("cmp_render");

    g.bench_function("miniliquid", |b| {
        let env = miniliquid_env();
        let tmpl = env.template_from_str(INDEX_SOURCE).unwrap();
        b.iter(|| {
            tmpl.render(black_box(&Context::default())).unwrap();
        });
    });

    g.bench_function("liquid", |b| {
        let tmpl = liquid_parser().parse(INDEX_SOURCE).unwrap();
        b.iter(|| {
            tmpl.render(&black_box(liquid::to_object(&Context::default())).unwrap())
                .unwrap();
        });
    });
}
