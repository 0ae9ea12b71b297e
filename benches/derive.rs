use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ll1_syntax::{elem, recursive, Parser, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Num,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tok(Kind);

impl Token for Tok {
    type Kind = Kind;

    fn kind(&self) -> Kind {
        self.0
    }
}

fn nested() -> Parser<Tok> {
    recursive(|expr| {
        elem(Kind::Num).or(&expr
            .preceded(&elem(Kind::Open))
            .terminated(&elem(Kind::Close)))
    })
}

fn deep_input(depth: usize) -> Vec<Tok> {
    let mut input = vec![Tok(Kind::Open); depth];
    input.push(Tok(Kind::Num));
    input.extend(vec![Tok(Kind::Close); depth]);
    input
}

fn bench_derive(c: &mut Criterion) {
    let expr = nested();
    let input = deep_input(64);
    c.bench_function("parse_nested_64", |b| {
        b.iter(|| expr.apply(black_box(input.clone())).is_parsed())
    });

    c.bench_function("first_10_trails", |b| {
        b.iter(|| expr.trails().take(10).count())
    });

    c.bench_function("conflicts_clean_grammar", |b| {
        b.iter(|| expr.conflicts().len())
    });
}

criterion_group!(benches, bench_derive);
criterion_main!(benches);
