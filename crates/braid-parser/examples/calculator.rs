//! A four-function calculator: tokens, recursion through `Delayed`, and
//! transforms that fold matched operator chains into numbers.
//!
//! ```text
//! cargo run --example calculator -- "1 + 2 * (3 - 4.5)"
//! ```

use braid_parser::{patterns, Grammar, ParseError, Parser, ParserConfig, Value};

fn as_f64(v: Value) -> f64 {
    match v {
        Value::Float(f) => f.into_inner(),
        Value::Int(n) => n as f64,
        other => panic!("operand expected, got {other}"),
    }
}

/// Fold `[operand, op, operand, op, operand, ...]` left to right.
fn eval_chain(vs: Vec<Value>) -> Vec<Value> {
    let mut iter = vs.into_iter();
    let mut acc = as_f64(iter.next().expect("at least one operand"));
    while let (Some(op), Some(rhs)) = (iter.next(), iter.next()) {
        let rhs = as_f64(rhs);
        match op.as_str() {
            Some("*") => acc *= rhs,
            Some("/") => acc /= rhs,
            Some("+") => acc += rhs,
            Some("-") => acc -= rhs,
            other => panic!("operator expected, got {other:?}"),
        }
    }
    vec![Value::float(acc)]
}

fn calculator() -> Result<Parser, ParseError> {
    let g = Grammar::new();
    let number = g.token(patterns::UNSIGNED_REAL);
    let symbol = g.token(r"[^0-9a-zA-Z \t\r\n]");
    let expr = g.delayed();

    let num = number
        .matcher()
        .map(|v| Value::float(v.as_str().expect("a lexeme").parse().expect("a number")));
    let term = num | (symbol.lit("(").drop_value() & &expr & symbol.lit(")").drop_value());
    let factor =
        (term.clone() & ((symbol.lit("*") | symbol.lit("/")) & term).many()).apply_raw(eval_chain);
    let sum = (factor.clone() & ((symbol.lit("+") | symbol.lit("-")) & factor).many())
        .apply_raw(eval_chain);
    expr.define(&sum);

    sum.parser(ParserConfig::new())
}

fn main() -> Result<(), ParseError> {
    let parser = calculator()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: calculator <expression>...");
        return Ok(());
    }
    for line in args {
        match parser.parse(&line) {
            Ok(values) => println!("{line} = {}", values[0]),
            Err(err) => eprintln!("{line}: {err}"),
        }
    }
    Ok(())
}
