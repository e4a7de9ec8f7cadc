use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sprig_parser::{parse_expression, parse_markup, parse_template, Delimiters};

fn parse_simple_expression(c: &mut Criterion) {
    let source = "user.name#upper";

    c.bench_function("parse_simple_expression", |b| {
        b.iter(|| parse_expression(black_box(source)))
    });
}

fn parse_complex_expression(c: &mut Criterion) {
    let source = "items.length > 0 && !loading ? (total * rate)#currency:'$',2 : { empty: true, label }";

    c.bench_function("parse_complex_expression", |b| {
        b.iter(|| parse_expression(black_box(source)))
    });
}

fn parse_interpolated_text(c: &mut Criterion) {
    let source = "Hello {{ user.first }} {{ user.last#upper }}, you have {{ inbox.length }} messages";

    c.bench_function("parse_interpolated_text", |b| {
        b.iter(|| parse_template(black_box(source), Delimiters::MUSTACHE))
    });
}

fn parse_large_markup(c: &mut Criterion) {
    let mut source = String::new();

    for i in 0..100 {
        source.push_str(&format!(
            r#"<section :if="visible{i}" class="card">
                <h2 $title="title{i}">{{{{ heading{i}#upper }}}}</h2>
                <ul><li :for="item, idx of list{i}" @click="pick(item)">{{{{ idx }}}}: {{{{ item.name }}}}</li></ul>
                <input :model="query{i}" model-debounce="100">
            </section>"#
        ));
    }

    c.bench_function("parse_large_markup", |b| {
        b.iter(|| parse_markup(black_box(&source)))
    });
}

criterion_group!(
    benches,
    parse_simple_expression,
    parse_complex_expression,
    parse_interpolated_text,
    parse_large_markup
);
criterion_main!(benches);
