use ll1_syntax::{
    elem, empty, failure, one_of, recursive, succeed, Conflict, ParseResult, Parser, Token,
    Value,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    A,
    B,
    C,
    Num,
    Open,
    Close,
}

/// Test tokens carry nothing but their kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tok(Kind);

impl Token for Tok {
    type Kind = Kind;

    fn kind(&self) -> Kind {
        self.0
    }
}

const A: Tok = Tok(Kind::A);
const B: Tok = Tok(Kind::B);
const NUM: Tok = Tok(Kind::Num);
const OPEN: Tok = Tok(Kind::Open);
const CLOSE: Tok = Tok(Kind::Close);

/// number | '(' expr ')'
fn paren_grammar() -> Parser<Tok> {
    recursive(|expr| {
        elem(Kind::Num).or(&expr
            .preceded(&elem(Kind::Open))
            .terminated(&elem(Kind::Close)))
    })
}

/*========================================*/
/*          Single elements              */
/*========================================*/

#[test]
fn test_single_element() {
    let parser: Parser<Tok> = elem(Kind::A);

    assert_eq!(parser.first(), HashSet::from([Kind::A]));
    assert_eq!(parser.nullable(), None);
    assert!(parser.is_ll1());

    match parser.apply(vec![A]) {
        ParseResult::Parsed { value, .. } => assert_eq!(value, Value::token(A)),
        other => panic!("expected parse, got {:?}", other),
    }
    match parser.apply(vec![B]) {
        ParseResult::UnexpectedToken { token, residual } => {
            assert_eq!(token, B);
            assert_eq!(residual.first(), HashSet::from([Kind::A]));
        }
        other => panic!("expected unexpected token, got {:?}", other),
    }
    assert!(matches!(
        parser.apply(vec![]),
        ParseResult::UnexpectedEnd { .. }
    ));
}

#[test]
fn test_one_of() {
    let parser: Parser<Tok> = one_of([Kind::A, Kind::B, Kind::C]);
    assert_eq!(parser.first(), HashSet::from([Kind::A, Kind::B, Kind::C]));
    assert!(parser.is_ll1());
    assert!(parser.apply(vec![B]).is_parsed());
    assert!(!parser.apply(vec![NUM]).is_parsed());
}

/*========================================*/
/*          Repetition                   */
/*========================================*/

#[test]
fn test_many0() {
    let parser: Parser<Tok> = elem(Kind::A).many0();

    assert_eq!(parser.nullable(), Some(Value::empty_seq()));
    assert!(parser.is_ll1());

    // Trails are restartable: a clone taken mid-enumeration continues
    // independently over the shared computation.
    let mut original = parser.trails();
    assert_eq!(original.next(), Some(vec![]));
    let mut forked = original.clone();
    assert_eq!(original.next(), Some(vec![Kind::A]));
    assert_eq!(forked.next(), Some(vec![Kind::A]));

    let trails: Vec<_> = parser.trails().take(5).collect();
    assert_eq!(
        trails,
        vec![
            vec![],
            vec![Kind::A],
            vec![Kind::A, Kind::A],
            vec![Kind::A, Kind::A, Kind::A],
            vec![Kind::A, Kind::A, Kind::A, Kind::A],
        ]
    );

    match parser.apply(vec![A, A, A]) {
        ParseResult::Parsed { value, .. } => {
            assert_eq!(
                value,
                Value::seq(vec![Value::token(A), Value::token(A), Value::token(A)])
            );
        }
        other => panic!("expected parse, got {:?}", other),
    }
}

#[test]
fn test_many1() {
    let parser: Parser<Tok> = elem(Kind::A).many1();
    assert_eq!(parser.nullable(), None);
    assert!(parser.is_ll1());
    assert!(!parser.apply(vec![]).is_parsed());
    match parser.apply(vec![A, A]) {
        ParseResult::Parsed { value, .. } => {
            assert_eq!(value.as_seq().unwrap().len(), 2);
        }
        other => panic!("expected parse, got {:?}", other),
    }
}

#[test]
fn test_many_sep() {
    let parser: Parser<Tok> = elem(Kind::A).many_sep1(&elem(Kind::B));
    assert!(parser.is_ll1());
    assert!(!parser.apply(vec![]).is_parsed());
    assert!(!parser.apply(vec![A, B]).is_parsed());
    match parser.apply(vec![A, B, A, B, A]) {
        ParseResult::Parsed { value, .. } => {
            assert_eq!(
                value,
                Value::seq(vec![Value::token(A), Value::token(A), Value::token(A)])
            );
        }
        other => panic!("expected parse, got {:?}", other),
    }

    let parser0: Parser<Tok> = elem(Kind::A).many_sep0(&elem(Kind::B));
    assert!(parser0.is_ll1());
    assert_eq!(parser0.apply(vec![]).value(), Some(&Value::empty_seq()));
    assert!(parser0.apply(vec![A, B, A]).is_parsed());
}

#[test]
fn test_prepend_append() {
    let parser: Parser<Tok> = elem(Kind::A).prepend(&elem(Kind::B).many0()).append(&elem(Kind::C));
    match parser.apply(vec![A, B, B, Tok(Kind::C)]) {
        ParseResult::Parsed { value, .. } => {
            let items = value.as_seq().unwrap().to_vec();
            assert_eq!(items.len(), 4);
            assert_eq!(items[0], Value::token(A));
            assert_eq!(items[3], Value::token(Tok(Kind::C)));
        }
        other => panic!("expected parse, got {:?}", other),
    }
}

#[test]
fn test_opt() {
    let parser: Parser<Tok> = elem(Kind::A).opt();
    assert!(parser.is_ll1());
    assert_eq!(parser.apply(vec![]).value(), Some(&Value::empty_seq()));
    assert_eq!(
        parser.apply(vec![A]).value(),
        Some(&Value::seq(vec![Value::token(A)]))
    );
}

/*========================================*/
/*          Conflicts                    */
/*========================================*/

#[test]
fn test_first_conflict() {
    let parser: Parser<Tok> = elem(Kind::A).or(&elem(Kind::A));
    assert!(!parser.is_ll1());

    let conflicts = parser.conflicts();
    assert_eq!(conflicts.len(), 1);
    match &conflicts[0] {
        Conflict::AmbiguityOnFirst { kinds, .. } => {
            assert_eq!(kinds, &HashSet::from([Kind::A]));
        }
        other => panic!("expected a first conflict, got {:?}", other),
    }
}

#[test]
fn test_nullable_conflict() {
    let parser: Parser<Tok> =
        succeed(Value::of(0)).or(&succeed(Value::of(1)));
    assert!(!parser.is_ll1());
    assert!(parser
        .conflicts()
        .iter()
        .any(|conflict| matches!(conflict, Conflict::AmbiguityOnEmpty { .. })));
}

#[test]
fn test_follow_conflict() {
    // Both branches of the disjunction can be followed by A, and the first
    // branch is nullable, so an A after it is ambiguous.
    let left: Parser<Tok> = succeed(Value::of(0)).or(&elem(Kind::A).map(|_| Value::of(1)));
    let parser = left.and(&elem(Kind::A));

    assert!(!parser.is_ll1());
    let conflicts = parser.conflicts();
    match conflicts
        .iter()
        .find(|conflict| matches!(conflict, Conflict::AmbiguityOnFollow { .. }))
    {
        Some(Conflict::AmbiguityOnFollow { kinds, .. }) => {
            assert_eq!(kinds, &HashSet::from([Kind::A]));
        }
        _ => panic!("expected a follow conflict in {:?}", conflicts),
    }

    // The parse itself is still deterministic: the consuming branch wins.
    assert!(!parser.apply(vec![A]).is_parsed());
    match parser.apply(vec![A, A]) {
        ParseResult::Parsed { value, .. } => {
            let (first, second) = (
                value.as_pair().unwrap().0.clone(),
                value.as_pair().unwrap().1.clone(),
            );
            assert_eq!(first, Value::of(1));
            assert_eq!(second, Value::token(A));
        }
        other => panic!("expected parse, got {:?}", other),
    }
}

#[test]
fn test_left_recursion_conflict() {
    let parser: Parser<Tok> = recursive(|p| p.and(&elem(Kind::A)));
    assert!(!parser.is_ll1());
    assert!(parser
        .conflicts()
        .iter()
        .any(|conflict| matches!(conflict, Conflict::LeftRecursion { .. })));

    // Unspecified semantics, but each token must still terminate.
    assert!(!parser.apply(vec![A]).is_parsed());
}

#[test]
fn test_should_not_follow_witnesses() {
    // Every should-not-follow kind, sequenced with that kind, conflicts.
    let parser: Parser<Tok> = elem(Kind::A).many0();
    let snf = parser.should_not_follow();
    assert_eq!(snf.keys().copied().collect::<HashSet<_>>(), HashSet::from([Kind::A]));
    for kind in snf.keys() {
        let extended = parser.and(&elem(*kind));
        assert!(!extended.is_ll1());
        assert!(extended
            .conflicts()
            .iter()
            .any(|conflict| matches!(conflict, Conflict::AmbiguityOnFollow { .. })));
    }
}

#[test]
fn test_conflict_prefix_trails() {
    // The ambiguity sits behind a 'B': the reported prefix must know that.
    let ambiguous: Parser<Tok> = elem(Kind::A).or(&elem(Kind::A));
    let parser = elem(Kind::B).and(&ambiguous);

    let conflicts = parser.conflicts();
    assert_eq!(conflicts.len(), 1);
    let prefix_trails: Vec<_> = conflicts[0].prefix().trails().take(1).collect();
    assert_eq!(prefix_trails, vec![vec![Kind::B]]);
}

/*========================================*/
/*          Nested grammar               */
/*========================================*/

#[test]
fn test_paren_grammar() {
    let expr = paren_grammar();
    assert!(expr.is_ll1());
    assert_eq!(expr.first(), HashSet::from([Kind::Num, Kind::Open]));

    match expr.apply(vec![OPEN, OPEN, NUM, CLOSE, CLOSE]) {
        ParseResult::Parsed { value, .. } => assert_eq!(value, Value::token(NUM)),
        other => panic!("expected parse, got {:?}", other),
    }
    let mid_parse = expr.apply(vec![OPEN, NUM]);
    assert!(matches!(mid_parse, ParseResult::UnexpectedEnd { .. }));
    assert_eq!(mid_parse.expected_kinds(), HashSet::from([Kind::Close]));
    match expr.apply(vec![CLOSE]) {
        ParseResult::UnexpectedToken { token, .. } => assert_eq!(token, CLOSE),
        other => panic!("expected unexpected token, got {:?}", other),
    }
}

#[test]
fn test_paren_trails_parse_back() {
    let expr = paren_grammar();
    let mut last_len = 0;
    for trail in expr.trails().take(6) {
        assert!(trail.len() >= last_len, "trails out of order");
        last_len = trail.len();
        let tokens: Vec<Tok> = trail.into_iter().map(Tok).collect();
        assert!(expr.apply(tokens).is_parsed());
    }
}

#[test]
fn test_derivative_steps() {
    let expr = paren_grammar();
    let input = vec![OPEN, NUM, CLOSE];

    // Deriving one token at a time agrees with running the whole input.
    let mut stepped = expr.clone();
    for token in &input {
        stepped = stepped.derive(token);
        assert!(stepped.is_productive());
    }
    let direct = expr.apply(input);
    assert_eq!(stepped.nullable().as_ref(), direct.value());
}

/*========================================*/
/*          Inverse parsing              */
/*========================================*/

#[test]
fn test_tokens_of_roundtrip() {
    let parser: Parser<Tok> = elem(Kind::A).many0();
    let target = Value::seq(vec![Value::token(A), Value::token(A)]);

    let sequences: Vec<_> = parser.tokens_of(&target).take(2).collect();
    assert_eq!(sequences, vec![vec![A, A]]);

    for tokens in sequences {
        assert_eq!(parser.apply(tokens).value(), Some(&target));
    }
}

#[test]
fn test_tokens_of_elem() {
    let parser: Parser<Tok> = elem(Kind::A);
    let hits: Vec<_> = parser.tokens_of(&Value::token(A)).take(2).collect();
    assert_eq!(hits, vec![vec![A]]);
    let misses: Vec<_> = parser.tokens_of(&Value::token(B)).take(2).collect();
    assert!(misses.is_empty());
}

#[test]
fn test_tokens_of_without_inverse() {
    // A plain `map` defaults to no candidates, blocking inversion.
    let parser: Parser<Tok> = elem(Kind::A).map(|_| Value::of("mapped"));
    let hits: Vec<_> = parser.tokens_of(&Value::of("mapped")).take(2).collect();
    assert!(hits.is_empty());
}

/*========================================*/
/*          Filter & completion          */
/*========================================*/

#[test]
fn test_filter() {
    let expr = paren_grammar();
    let flat = expr.filter(|kind| *kind != Kind::Open);

    assert!(flat.apply(vec![NUM]).is_parsed());
    assert!(!flat.apply(vec![OPEN, NUM, CLOSE]).is_parsed());
    // The unfiltered parser is untouched.
    assert!(expr.apply(vec![OPEN, NUM, CLOSE]).is_parsed());
}

#[test]
fn test_filter_makes_fresh_identities() {
    let expr = paren_grammar();
    let once = expr.filter(|_| true);
    let twice = expr.filter(|_| true);
    assert_ne!(once, twice);
    assert_ne!(once, expr);
    assert!(once.apply(vec![OPEN, NUM, CLOSE]).is_parsed());
    assert!(twice.apply(vec![OPEN, NUM, CLOSE]).is_parsed());
}

fn samples(kind: &Kind) -> Vec<Tok> {
    vec![Tok(*kind)]
}

#[test]
fn test_completions() {
    let expr = paren_grammar();

    // Mid-parse residual: after "( num", the only completion is ")".
    let residual = match expr.apply(vec![OPEN, NUM]) {
        ParseResult::UnexpectedEnd { residual } => residual,
        other => panic!("expected unexpected end, got {:?}", other),
    };
    match residual.complete(samples) {
        Some(ParseResult::Parsed { value, .. }) => assert_eq!(value, Value::token(NUM)),
        other => panic!("expected a completion, got {:?}", other),
    }

    // From the start, completions come shortest first.
    let first: Vec<_> = expr
        .completions(samples)
        .take(2)
        .map(|result| result.is_parsed())
        .collect();
    assert_eq!(first, vec![true, true]);
}

#[test]
fn test_completions_respect_samples() {
    let expr = paren_grammar();
    // No sample for Num: only parenthesized completions remain, and every
    // trail still needs a Num inside, so nothing completes.
    let no_num = |kind: &Kind| {
        if *kind == Kind::Num {
            Vec::new()
        } else {
            vec![Tok(*kind)]
        }
    };
    assert!(expr.complete(no_num).is_none());
}

/*========================================*/
/*          Values through maps          */
/*========================================*/

#[test]
fn test_map_and_unit() {
    let count: Parser<Tok> = elem(Kind::A)
        .many0()
        .map(|value| Value::of(value.as_seq().map_or(0, |items| items.len())));
    assert_eq!(count.apply(vec![A, A, A]).value(), Some(&Value::of(3usize)));

    let voided: Parser<Tok> = elem(Kind::B).void();
    assert_eq!(voided.apply(vec![B]).value(), Some(&Value::unit()));

    // `unit` makes the discarded side recoverable for inverse parsing.
    let sep: Parser<Tok> = elem(Kind::B).unit(Value::token(B));
    let pair = elem::<Tok>(Kind::A).and(&sep);
    let target = Value::pair(Value::token(A), Value::unit());
    let sequences: Vec<_> = pair.tokens_of(&target).take(2).collect();
    assert_eq!(sequences, vec![vec![A, B]]);
}

#[test]
fn test_failure_is_or_identity() {
    let parser: Parser<Tok> = failure().or(&elem(Kind::A));
    assert!(parser.apply(vec![A]).is_parsed());
    let parser: Parser<Tok> = elem::<Tok>(Kind::A).or(&failure());
    assert!(parser.apply(vec![A]).is_parsed());
    assert!(!failure::<Tok>().apply(vec![A]).is_parsed());
}

#[test]
fn test_empty() {
    let parser: Parser<Tok> = empty();
    assert_eq!(parser.apply(vec![]).value(), Some(&Value::unit()));
    assert!(!parser.apply(vec![A]).is_parsed());
    // empty ~ p and p ~ empty accept exactly what p accepts.
    assert!(empty::<Tok>().and(&elem(Kind::A)).apply(vec![A]).is_parsed());
    assert!(elem::<Tok>(Kind::A).and(&empty()).apply(vec![A]).is_parsed());
}
