//! Cross-cutting properties of the evaluator: cursor monotonicity,
//! wrapper neutrality, rewriter confluence, determinism, and resource
//! monitors.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use braid_parser::{
    Grammar, Monitor, ParseError, Parser, ParserConfig, Profile, Rewriter, Value,
};
use pretty_assertions::assert_eq;

#[test]
fn cursors_never_move_backwards() {
    let g = Grammar::new();
    let m = (g.any("ab").many() & g.lit("a").opt()).join();
    let p = m
        .parser(ParserConfig::new().no_full_match())
        .expect("grammar compiles");
    for result in p.match_all("abab") {
        let (_, cursor) = result.expect("no fatal errors");
        assert!(cursor.offset() <= 4);
    }
}

#[test]
fn single_child_wrappers_are_neutral() {
    // And(m) == m == Or(m) for transform-free m
    let g = Grammar::new();
    let bare = g.any("ab").many().join();
    let wrapped_and = g.all(&[bare.clone()]);
    let wrapped_or = g.one_of(&[bare.clone()]);

    let collect = |m: &braid_parser::M| -> Vec<(Vec<Value>, usize)> {
        m.parser(ParserConfig::new().no_full_match())
            .expect("grammar compiles")
            .match_all("aab")
            .map(|r| {
                let (values, cursor) = r.expect("no fatal errors");
                (values, cursor.offset())
            })
            .collect()
    };
    let baseline = collect(&bare);
    assert_eq!(collect(&wrapped_and), baseline);
    assert_eq!(collect(&wrapped_or), baseline);
}

#[test]
fn flatten_and_compose_are_confluent() {
    let build = |rewriters: Vec<Rewriter>| -> Vec<Vec<Value>> {
        let g = Grammar::new();
        let inner = (g.lit("a") & g.lit("b")) & g.lit("c");
        let m = (inner | g.lit("abc").map(|v| v)).join();
        m.parser(ParserConfig::new().rewriters(rewriters))
            .expect("grammar compiles")
            .parse_all("abc")
            .collect::<Result<_, _>>()
            .expect("no fatal errors")
    };
    let one = build(vec![Rewriter::Flatten, Rewriter::ComposeTransforms]);
    let two = build(vec![Rewriter::ComposeTransforms, Rewriter::Flatten]);
    assert_eq!(one, two);
}

#[test]
fn parse_all_is_deterministic() {
    let run = || -> Vec<Vec<Value>> {
        let g = Grammar::new();
        let m = (g.any("ab").repeat(0, 3) & g.any("ab").repeat(0, 3)).join();
        m.parser(ParserConfig::new().no_full_match())
            .expect("grammar compiles")
            .parse_all("abab")
            .collect::<Result<_, _>>()
            .expect("no fatal errors")
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn first_commits_to_its_first_branch() {
    let g = Grammar::new();
    let m = g.first_of(&[g.lit("ab").join(), g.lit("a").join()]);
    let p = m
        .parser(ParserConfig::new().no_full_match())
        .expect("grammar compiles");
    // Or would fall back to "a" after "ab" is exhausted; First does not
    let results: Vec<Vec<Value>> = p
        .parse_all("abx")
        .collect::<Result<_, _>>()
        .expect("no fatal errors");
    assert_eq!(results, vec![vec![Value::from("ab")]]);
}

#[test]
fn lookahead_consumes_nothing() {
    let g = Grammar::new();
    let m = g.lit("ab").lookahead() & g.lit("abc");
    let p = m.parser(ParserConfig::new()).expect("grammar compiles");
    assert_eq!(
        p.parse("abc").expect("input parses"),
        vec![Value::from("abc")]
    );

    let g = Grammar::new();
    let m = g.lit("x").not_lookahead() & g.lit("abc");
    let p = m.parser(ParserConfig::new()).expect("grammar compiles");
    assert!(p.parse("abc").is_ok());

    let g = Grammar::new();
    let m = g.lit("a").not_lookahead() & g.lit("abc");
    let p = m.parser(ParserConfig::new()).expect("grammar compiles");
    assert!(p.parse("abc").is_err());
}

#[test]
fn eos_matches_only_at_the_end() {
    let g = Grammar::new();
    let m = g.lit("ab") & g.eos();
    let p = m
        .parser(ParserConfig::new().no_full_match())
        .expect("grammar compiles");
    assert!(p.parse("ab").is_ok());
    assert!(p.parse("abc").is_err());
}

#[test]
fn round_trip_reserializes_the_input() {
    let g = Grammar::new();
    let word = g.any("abc").repeat(1, None);
    let m = (word.separated_by(&g.lit(","), 1, None)).join();
    let p = m.parser(ParserConfig::new()).expect("grammar compiles");
    for input in ["a", "ab,c", "abc,ab,a", "cc,cc"] {
        assert_eq!(
            p.parse(input).expect("input parses"),
            vec![Value::from(input)],
            "{input}"
        );
    }
}

#[test]
fn timeout_monitor_cancels() {
    // an ambiguous grammar with exponentially many parses
    let g = Grammar::new();
    let a = g.any("a").many().join();
    let m = (a.clone() & a.clone() & a).join();
    let p = m
        .parser(
            ParserConfig::new()
                .no_full_match()
                .timeout(Duration::from_millis(0)),
        )
        .expect("grammar compiles");
    let outcome: Result<Vec<_>, _> = p.parse_all(&"a".repeat(64)).collect();
    match outcome {
        Err(ParseError::Cancelled { .. }) => {}
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn profile_monitor_observes_the_run() {
    let profile = Rc::new(RefCell::new(Profile::default()));

    struct Shared(Rc<RefCell<Profile>>);
    impl Monitor for Shared {
        fn next_iteration(&mut self, epoch: u64, depth: usize) -> Result<(), ParseError> {
            self.0.borrow_mut().next_iteration(epoch, depth)
        }
        fn push(&mut self, describe: &str) {
            self.0.borrow_mut().push(describe);
        }
        fn result(&mut self) {
            self.0.borrow_mut().result();
        }
    }

    let g = Grammar::new();
    let m = g.lit("a") & g.lit("b");
    let p = m
        .parser(ParserConfig::new().monitor({
            let profile = profile.clone();
            Rc::new(move || Box::new(Shared(profile.clone())))
        }))
        .expect("grammar compiles");
    assert!(p.parse("ab").is_ok());

    let seen = profile.borrow();
    assert!(seen.epochs > 0);
    assert!(seen.pushes >= 3, "root and two literals at least");
    assert_eq!(seen.results, 1);
}

#[test]
fn pool_limit_trades_completeness_for_memory() {
    let g = Grammar::new();
    let m = (g.any("ab").many() & g.any("ab").many()).join();
    let unlimited: Parser = m
        .parser(ParserConfig::new().no_full_match())
        .expect("grammar compiles");
    let limited: Parser = m
        .parser(ParserConfig::new().no_full_match().pool_limit(4))
        .expect("grammar compiles");

    let all: Vec<_> = unlimited
        .match_all("abab")
        .collect::<Result<_, _>>()
        .expect("no fatal errors");
    let some: Vec<_> = limited
        .match_all("abab")
        .collect::<Result<_, _>>()
        .expect("no fatal errors");
    assert!(some.len() <= all.len());
    assert!(!some.is_empty(), "the first result is on the live path");
}

#[test]
fn unbound_delayed_is_a_structural_error() {
    let g = Grammar::new();
    let d = g.delayed();
    let m = g.lit("a") & &d;
    let p = m.parser(ParserConfig::new()).expect("grammar compiles");
    match p.parse("ab") {
        Err(ParseError::MatcherType { node }) => {
            assert!(node.contains("Delayed"), "{node}");
        }
        other => panic!("expected a matcher type error, got {other:?}"),
    }
}
