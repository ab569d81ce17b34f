use criterion::{black_box, criterion_group, criterion_main, Criterion};
use treepath_xpath::host::{elem, SimpleElement};
use treepath_xpath::tree_builders::build_node_tree;
use treepath_xpath::{DynamicContextBuilder, Selector, XPath2Parser};

fn sample_tree(width: usize, depth: usize) -> SimpleElement {
    fn level(width: usize, depth: usize) -> treepath_xpath::host::SimpleElementBuilder {
        let mut e = elem("node").attr("depth", &depth.to_string());
        if depth > 0 {
            for _ in 0..width {
                e = e.child(level(width, depth - 1));
            }
        }
        e
    }
    level(width, depth).build()
}

fn bench_parse(c: &mut Criterion) {
    let parser = XPath2Parser::new();
    c.bench_function("parse_path_with_predicates", |b| {
        b.iter(|| {
            parser
                .parse(black_box("/node/node[@depth > 1]/node[last()]/@depth"))
                .unwrap()
        })
    });
    c.bench_function("parse_flwor", |b| {
        b.iter(|| {
            parser
                .parse(black_box(
                    "for $n in //node return count($n/node[position() < 3])",
                ))
                .unwrap()
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let root = sample_tree(4, 4);
    let built = build_node_tree(&root);
    let selector = Selector::new("//node[@depth = '1']").unwrap();

    c.bench_function("evaluate_descendant_predicate", |b| {
        b.iter(|| {
            let mut ctx = DynamicContextBuilder::new()
                .with_tree(built.tree.clone())
                .build();
            selector.compiled().evaluate(&mut ctx).unwrap()
        })
    });

    let compiled = XPath2Parser::new()
        .parse("count(//node/@depth)")
        .unwrap();
    c.bench_function("evaluate_attribute_count", |b| {
        b.iter(|| {
            let mut ctx = DynamicContextBuilder::new()
                .with_tree(built.tree.clone())
                .build();
            compiled.evaluate(&mut ctx).unwrap()
        })
    });
}

criterion_group!(benches, bench_parse, bench_evaluate);
criterion_main!(benches);
