use braid_parser::{patterns, Grammar, Parser, ParserConfig, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const INPUT: &str = "1.23e4 + 2.34e5 * (3.45e6 + 4.56e7 - 5.67e8)";

fn calculator(config: ParserConfig) -> Parser {
    let g = Grammar::new();
    let number = g.token(patterns::UNSIGNED_REAL);
    let symbol = g.token(r"[^0-9a-zA-Z \t\r\n]");
    let expr_d = g.delayed();

    let term = (number.matcher() | (symbol.lit("(") & &expr_d & symbol.lit(")")))
        .apply(|vs| Value::tree("Term", vs));
    let factor = (term.clone() & ((symbol.lit("*") | symbol.lit("/")) & term).many())
        .apply(|vs| Value::tree("Factor", vs));
    let expr = (factor.clone() & ((symbol.lit("+") | symbol.lit("-")) & factor).many())
        .apply(|vs| Value::tree("Expression", vs));
    expr_d.define(&expr);

    expr.parser(config).expect("grammar compiles")
}

fn bench_calculator(c: &mut Criterion) {
    let basic = calculator(ParserConfig::new());
    c.bench_function("calculator/basic", |b| {
        b.iter(|| basic.parse(black_box(INPUT)).expect("input parses"))
    });

    let memoized = calculator(ParserConfig::new().auto_memoize());
    c.bench_function("calculator/memoized", |b| {
        b.iter(|| memoized.parse(black_box(INPUT)).expect("input parses"))
    });
}

criterion_group!(benches, bench_calculator);
criterion_main!(benches);
