// This design achieves all of the following:
//
// - Parsers are plain values: cheap to clone, immutable, freely shared.
// - Recursive grammars are ordinary cyclic graphs, not a special mode;
//   every analysis copes with cycles through one visited-set discipline.
// - Value types are erased once, at the term representation, instead of
//   threading generics through every combinator and through recursion.
// - Enumeration (trails, inverse parsing, completion) is lazy all the way
//   down; nothing expands a grammar loop eagerly.
//
// Any change to the design is liable to break one of these properties, so
// if considering a change check this list first.

//! # ll1_syntax
//!
//! **LL(1) parser combinators as immutable term graphs.**
//!
//! A parser here is a value, built from single-token acceptors and a small
//! set of combinators. Before you run it you can *analyze* it: ask whether
//! it accepts the empty input, which token kinds it may start with, and
//! whether the grammar is LL(1). If it is not, you get back structured
//! conflicts that say exactly where and why. Running it is a derivative
//! loop: each input token rewrites the parser into the parser for the rest
//! of the input.
//!
//! ```
//! use ll1_syntax::{elem, ParseResult, Parser, Token};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! struct Ch(char);
//!
//! impl Token for Ch {
//!     type Kind = char;
//!     fn kind(&self) -> char {
//!         self.0
//!     }
//! }
//!
//! // Zero or more 'a's, then one 'b'.
//! let parser: Parser<Ch> = elem('a').many0().and(&elem('b'));
//! assert!(parser.is_ll1());
//!
//! match parser.apply(vec![Ch('a'), Ch('a'), Ch('b')]) {
//!     ParseResult::Parsed { value, .. } => {
//!         let (heads, last) = value.as_pair().unwrap();
//!         assert_eq!(heads.as_seq().unwrap().len(), 2);
//!         assert_eq!(last.as_token(), Some(&Ch('b')));
//!     }
//!     other => panic!("expected a parse, got {:?}", other),
//! }
//!
//! // Trails enumerate accepted inputs by kind, shortest first.
//! let trails: Vec<_> = parser.trails().take(3).collect();
//! assert_eq!(trails, vec![vec!['b'], vec!['a', 'b'], vec!['a', 'a', 'b']]);
//! ```
//!
//! ## Tokens and kinds
//!
//! The library never looks inside your tokens; it only asks for their
//! [`Token::kind`], an equatable tag. Lexing is your job: feed `apply`
//! any iterator of tokens.
//!
//! ## LL(1) validation
//!
//! [`Parser::conflicts`] reports every way the grammar falls outside LL(1):
//!
//! - two alternatives that both accept the empty input;
//! - two alternatives that can start with the same kind;
//! - a kind that could either continue a sequence's left side or start its
//!   right side;
//! - a parser that re-enters itself without consuming a token.
//!
//! Each conflict carries a *prefix parser* whose trails are the token-kind
//! sequences leading up to the ambiguity.
//!
//! ```
//! use ll1_syntax::{elem, Conflict, Parser, Token};
//! # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! # struct Ch(char);
//! # impl Token for Ch {
//! #     type Kind = char;
//! #     fn kind(&self) -> char {
//! #         self.0
//! #     }
//! # }
//!
//! let ambiguous: Parser<Ch> = elem('x').or(&elem('x'));
//! assert!(!ambiguous.is_ll1());
//! assert!(matches!(
//!     ambiguous.conflicts().as_slice(),
//!     [Conflict::AmbiguityOnFirst { .. }]
//! ));
//! ```
//!
//! ## Reference
//!
//! Here's a quick reference table of the combinators and the shape of the
//! [`Value`] they produce.
//!
//! ```text
//! COMBINATOR            OUTPUT VALUE
//!
//! ~~ leaves ~~
//! elem(k)               Token
//! succeed(v)            v, consuming nothing
//! empty()               Unit, consuming nothing
//! failure()             never succeeds
//!
//! ~~ mapping ~~
//! P.map(f)              f(P)
//! P.map_with_inverse(f, g)  f(P); g used by tokens_of
//! P.void()              Unit
//! P.unit(v)             Unit; v used by tokens_of
//! P.once()              [P]
//!
//! ~~ combination ~~
//! P.and(Q)              Pair(P, Q)
//! P.concat(Q)           P ++ Q   (both sequence-valued)
//! P.or(Q)               whichever side parses
//! P.preceded(Q)         P        (Q parsed first, discarded)
//! P.terminated(Q)       P        (Q parsed after, discarded)
//! P.prepend(Q)          [P] ++ Q
//! P.append(Q)           P ++ [Q]
//!
//! ~~ repetition ~~
//! P.opt()               [] or [P]
//! P.many0()             [P, ...]
//! P.many1()             [P, ...]
//! P.many_sep0(S)        [P, ...]
//! P.many_sep1(S)        [P, ...]
//!
//! ~~ recursion ~~
//! recursive(|this| ...) whatever the definition produces
//! ```

mod analysis;
mod conflict;
mod enumerate;
mod producer;
mod term;
mod value;

use itertools::structs::MultiProduct;
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use term::{
    concat_node, disjunction_node, elem_node, failure_node, recursive_from_thunk,
    recursive_node, seq_node, success_node, transform_node, Node, RecId,
};

#[cfg(feature = "flamegraphs")]
use no_nonsense_flamegraphs::span;

pub use conflict::Conflict;
pub use enumerate::{TokenSequences, Trails};
pub use value::{DynValue, Pair, Value};

/*========================================*/
/*          Interface                     */
/*========================================*/

/// A lexical token, as far as this library cares about one: something
/// cloneable that knows its kind.
///
/// The kind is the unit the grammar is written in; `elem(kind)` accepts any
/// token of that kind. Two tokens of the same kind are interchangeable for
/// parsing decisions, though the parsed [`Value`] keeps the actual token.
pub trait Token: Clone + PartialEq + 'static {
    type Kind: Clone + Eq + Hash + fmt::Debug + 'static;

    fn kind(&self) -> Self::Kind;
}

/// A parser producing a [`Value`]: an immutable node of a term graph.
///
/// Cloning is cheap (a reference-count bump) and clones share all analysis
/// caches. See the [crate docs](crate) for the combinator reference.
pub struct Parser<T: Token> {
    pub(crate) node: Rc<Node<T>>,
}

impl<T: Token> Clone for Parser<T> {
    fn clone(&self) -> Parser<T> {
        Parser {
            node: Rc::clone(&self.node),
        }
    }
}

/// Accept a single token of the given kind, producing it as the value.
pub fn elem<T: Token>(kind: T::Kind) -> Parser<T> {
    Parser {
        node: elem_node(kind),
    }
}

/// Accept the empty input, producing `value`.
pub fn succeed<T: Token>(value: Value<T>) -> Parser<T> {
    Parser {
        node: success_node(value),
    }
}

/// Accept the empty input, producing [`Value::Unit`].
pub fn empty<T: Token>() -> Parser<T> {
    succeed(Value::unit())
}

/// Accept nothing at all.
pub fn failure<T: Token>() -> Parser<T> {
    Parser {
        node: failure_node(),
    }
}

/// Accept a single token of any of the given kinds.
pub fn one_of<T: Token>(kinds: impl IntoIterator<Item = T::Kind>) -> Parser<T> {
    let mut parser = failure();
    for kind in kinds {
        parser = parser.or(&elem(kind));
    }
    parser
}

/// Define a parser in terms of itself.
///
/// The definition `f` receives a handle to the parser being defined and may
/// embed it anywhere, including mutually with other `recursive` calls. It
/// runs lazily, the first time the parser is parsed with or analyzed, so
/// the handle must not be analyzed *inside* `f`.
///
/// ```
/// use ll1_syntax::{elem, recursive, Parser, Token};
/// # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// # struct Ch(char);
/// # impl Token for Ch {
/// #     type Kind = char;
/// #     fn kind(&self) -> char {
/// #         self.0
/// #     }
/// # }
///
/// // nested ::= '(' nested ')' | 'x'
/// let nested: Parser<Ch> = recursive(|nested| {
///     nested
///         .preceded(&elem('('))
///         .terminated(&elem(')'))
///         .or(&elem('x'))
/// });
/// assert!(nested.is_ll1());
/// assert!(nested.apply("((x))".chars().map(Ch)).is_parsed());
/// ```
pub fn recursive<T: Token>(f: impl FnOnce(Parser<T>) -> Parser<T> + 'static) -> Parser<T> {
    Parser {
        node: recursive_node(f),
    }
}

/*========================================*/
/*          Combinators                   */
/*========================================*/

impl<T: Token> Parser<T> {
    /// Parse `self` followed by `other`, producing a [`Value::Pair`].
    pub fn and(&self, other: &Parser<T>) -> Parser<T> {
        Parser {
            node: seq_node(Rc::clone(&self.node), Rc::clone(&other.node)),
        }
    }

    /// Parse `self` followed by `other` and concatenate their values, both
    /// viewed as sequences. Builds right-leaning chains, so accumulating a
    /// long sequence from the left stays linear.
    pub fn concat(&self, other: &Parser<T>) -> Parser<T> {
        Parser {
            node: concat_node(Rc::clone(&self.node), Rc::clone(&other.node)),
        }
    }

    /// Parse whichever of `self` and `other` matches. For the grammar to be
    /// LL(1) the two sides must be distinguishable by one token of
    /// look-ahead; [`Parser::conflicts`] reports when they are not.
    pub fn or(&self, other: &Parser<T>) -> Parser<T> {
        Parser {
            node: disjunction_node(Rc::clone(&self.node), Rc::clone(&other.node)),
        }
    }

    /// Transform the parsed value with `func`. The result has no inverse:
    /// [`Parser::tokens_of`] finds no token sequences through it. Use
    /// [`Parser::map_with_inverse`] when you need inversion.
    pub fn map(&self, func: impl Fn(Value<T>) -> Value<T> + 'static) -> Parser<T> {
        self.map_with_inverse(func, |_| Vec::new())
    }

    /// Transform the parsed value with `func`; `inverse` maps a target value
    /// back to the candidate values `func` could have produced it from, for
    /// [`Parser::tokens_of`].
    pub fn map_with_inverse(
        &self,
        func: impl Fn(Value<T>) -> Value<T> + 'static,
        inverse: impl Fn(&Value<T>) -> Vec<Value<T>> + 'static,
    ) -> Parser<T> {
        Parser {
            node: transform_node(Rc::new(func), Rc::new(inverse), Rc::clone(&self.node)),
        }
    }

    /// Discard the parsed value, producing [`Value::Unit`]. Not invertible;
    /// see [`Parser::unit`].
    pub fn void(&self) -> Parser<T> {
        self.map(|_| Value::unit())
    }

    /// Discard the parsed value, producing [`Value::Unit`]; inverse parsing
    /// reconstructs the discarded value as `default`.
    pub fn unit(&self, default: Value<T>) -> Parser<T> {
        self.map_with_inverse(
            |_| Value::unit(),
            move |target| {
                if matches!(target, Value::Unit) {
                    vec![default.clone()]
                } else {
                    Vec::new()
                }
            },
        )
    }

    /// Wrap the parsed value into a one-element sequence, ready for
    /// [`Parser::concat`].
    pub fn once(&self) -> Parser<T> {
        self.map_with_inverse(
            |value| Value::seq(vec![value]),
            |target| match target.as_seq() {
                Some([item]) => vec![item.clone()],
                _ => Vec::new(),
            },
        )
    }

    /// Parse `prev` first, then `self`, keeping only `self`'s value.
    ///
    /// For inverse parsing the discarded side is reconstructed as
    /// [`Value::Unit`], so `prev` should be a [`Parser::unit`]-style parser
    /// if you need [`Parser::tokens_of`] to see through this.
    pub fn preceded(&self, prev: &Parser<T>) -> Parser<T> {
        prev.and(self).map_with_inverse(
            |value| {
                if let Some((_, second)) = value.as_pair() {
                    second.clone()
                } else {
                    value
                }
            },
            |target| vec![Value::pair(Value::unit(), target.clone())],
        )
    }

    /// Parse `self`, then `next`, keeping only `self`'s value. The same
    /// inverse caveat as [`Parser::preceded`] applies to `next`.
    pub fn terminated(&self, next: &Parser<T>) -> Parser<T> {
        self.and(next).map_with_inverse(
            |value| {
                if let Some((first, _)) = value.as_pair() {
                    first.clone()
                } else {
                    value
                }
            },
            |target| vec![Value::pair(target.clone(), Value::unit())],
        )
    }

    /// `self` prepended, as an element, to the sequence parsed by `rest`.
    pub fn prepend(&self, rest: &Parser<T>) -> Parser<T> {
        self.once().concat(rest)
    }

    /// The sequence parsed by `self` with the element parsed by `last`
    /// appended.
    pub fn append(&self, last: &Parser<T>) -> Parser<T> {
        self.concat(&last.once())
    }

    /// Zero or one occurrence, as a zero- or one-element sequence.
    pub fn opt(&self) -> Parser<T> {
        self.once().or(&succeed(Value::empty_seq()))
    }

    /// Zero or more occurrences, collected into a sequence.
    pub fn many0(&self) -> Parser<T> {
        star(self.once())
    }

    /// One or more occurrences, collected into a sequence.
    pub fn many1(&self) -> Parser<T> {
        self.once().concat(&star(self.once()))
    }

    /// Zero or more occurrences separated by `sep`, collected into a
    /// sequence; the separators are discarded.
    pub fn many_sep0(&self, sep: &Parser<T>) -> Parser<T> {
        succeed(Value::empty_seq()).or(&self.many_sep1(sep))
    }

    /// One or more occurrences separated by `sep`, collected into a
    /// sequence; the separators are discarded.
    pub fn many_sep1(&self, sep: &Parser<T>) -> Parser<T> {
        self.once().concat(&star(self.once().preceded(sep)))
    }
}

/// Zero or more repetitions of a sequence-valued parser, flattened.
fn star<T: Token>(element: Parser<T>) -> Parser<T> {
    recursive(move |rec| succeed(Value::empty_seq()).or(&element.concat(&rec)))
}

/*========================================*/
/*          Analysis                      */
/*========================================*/

impl<T: Token> Parser<T> {
    /// The value this parser gives the empty input, if it accepts it.
    pub fn nullable(&self) -> Option<Value<T>> {
        analysis::nullable(&self.node)
    }

    /// Does this parser accept at least one input?
    pub fn is_productive(&self) -> bool {
        analysis::productive(&self.node)
    }

    /// The kinds that may begin an accepted input.
    pub fn first(&self) -> HashSet<T::Kind> {
        analysis::first(&self.node)
    }

    /// The kinds that must not appear immediately after this parser when it
    /// could stop here, each mapped to a witness parser accepting the
    /// inputs that lead into the ambiguity.
    pub fn should_not_follow(&self) -> HashMap<T::Kind, Parser<T>> {
        analysis::should_not_follow(&self.node)
    }

    /// Every kind mentioned anywhere in the grammar.
    pub fn kinds(&self) -> HashSet<T::Kind> {
        analysis::kinds(&self.node)
    }

    /// Is the grammar LL(1)? Equivalent to [`Parser::conflicts`] being
    /// empty, without the cost of building witnesses.
    pub fn is_ll1(&self) -> bool {
        conflict::is_ll1(&self.node)
    }

    /// Every LL(1) conflict in the grammar. See [`Conflict`].
    pub fn conflicts(&self) -> Vec<Conflict<T>> {
        conflict::conflicts(&self.node)
    }

    /// All accepted inputs, as kind sequences, shortest first.
    pub fn trails(&self) -> Trails<T> {
        enumerate::trails(&self.node)
    }

    /// All token sequences that parse to `value`, shortest first. Relies on
    /// the inverses supplied to [`Parser::map_with_inverse`]; a plain
    /// [`Parser::map`] blocks inversion.
    pub fn tokens_of(&self, value: &Value<T>) -> TokenSequences<T> {
        enumerate::tokens(&self.node, value)
    }
}

/*========================================*/
/*          Parsing                       */
/*========================================*/

/// The outcome of feeding a token stream to a parser.
///
/// Every variant carries the residual parser, so a caller can diagnose a
/// failure (`residual.first()` is the set of expected kinds) or keep
/// parsing from where a success left off.
pub enum ParseResult<T: Token> {
    /// The whole input was consumed and the parser accepted it.
    Parsed { value: Value<T>, residual: Parser<T> },
    /// `token` cannot continue any accepted input; `residual` is the parser
    /// state just before it.
    UnexpectedToken { token: T, residual: Parser<T> },
    /// The input ended where the parser still required more.
    UnexpectedEnd { residual: Parser<T> },
}

impl<T: Token> ParseResult<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseResult::Parsed { .. })
    }

    /// The parsed value, on success.
    pub fn value(&self) -> Option<&Value<T>> {
        match self {
            ParseResult::Parsed { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn residual(&self) -> &Parser<T> {
        match self {
            ParseResult::Parsed { residual, .. } => residual,
            ParseResult::UnexpectedToken { residual, .. } => residual,
            ParseResult::UnexpectedEnd { residual } => residual,
        }
    }

    /// The kinds that would have been acceptable at the point of failure
    /// (or, after a success, the kinds that could extend the input).
    pub fn expected_kinds(&self) -> HashSet<T::Kind> {
        self.residual().first()
    }
}

impl<T: Token + fmt::Debug> fmt::Debug for ParseResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseResult::Parsed { value, .. } => {
                f.debug_struct("Parsed").field("value", value).finish()
            }
            ParseResult::UnexpectedToken { token, .. } => f
                .debug_struct("UnexpectedToken")
                .field("token", token)
                .finish(),
            ParseResult::UnexpectedEnd { .. } => f.debug_struct("UnexpectedEnd").finish(),
        }
    }
}

impl<T: Token> Parser<T> {
    /// The residual parser after consuming one token: it accepts exactly
    /// the remainders of the inputs `self` accepts that begin with `token`.
    pub fn derive(&self, token: &T) -> Parser<T> {
        let kind = token.kind();
        Parser {
            node: term::derive(&self.node, token, &kind),
        }
    }

    /// Run the parser over a token stream.
    ///
    /// Each token takes one derivative step; a token whose derivative
    /// accepts nothing stops the loop with
    /// [`ParseResult::UnexpectedToken`]. At the end of input the result is
    /// [`ParseResult::Parsed`] exactly when the residual parser is
    /// nullable.
    pub fn apply(&self, tokens: impl IntoIterator<Item = T>) -> ParseResult<T> {
        #[cfg(feature = "flamegraphs")]
        span!("apply");

        let mut current = self.clone();
        for token in tokens {
            let next = current.derive(&token);
            if !next.is_productive() {
                return ParseResult::UnexpectedToken {
                    token,
                    residual: current,
                };
            }
            current = next;
        }
        match current.nullable() {
            Some(value) => ParseResult::Parsed {
                value,
                residual: current,
            },
            None => ParseResult::UnexpectedEnd { residual: current },
        }
    }
}

/*========================================*/
/*          Filter                        */
/*========================================*/

impl<T: Token> Parser<T> {
    /// The same grammar with every `elem` of a kind rejected by `pred`
    /// replaced by failure.
    ///
    /// Recursive nodes are rebuilt with fresh identities, one per `filter`
    /// call (two filters of one parser are unrelated terms), but the graph
    /// shape is preserved: a recursion filtered twice *within* one call
    /// maps to a single fresh node.
    pub fn filter(&self, pred: impl Fn(&T::Kind) -> bool + 'static) -> Parser<T> {
        let pred: Rc<dyn Fn(&T::Kind) -> bool> = Rc::new(pred);
        let memo = Rc::new(RefCell::new(HashMap::new()));
        Parser {
            node: filter_node(&self.node, &pred, &memo),
        }
    }
}

type FilterMemo<T> = Rc<RefCell<HashMap<RecId, Parser<T>>>>;

fn filter_node<T: Token>(
    node: &Rc<Node<T>>,
    pred: &Rc<dyn Fn(&T::Kind) -> bool>,
    memo: &FilterMemo<T>,
) -> Rc<Node<T>> {
    match node.as_ref() {
        Node::Success(_) | Node::Failure => Rc::clone(node),
        Node::Elem(kind) => {
            if (**pred)(kind) {
                Rc::clone(node)
            } else {
                failure_node()
            }
        }
        Node::Transform(transform) => transform_node(
            Rc::clone(&transform.map),
            Rc::clone(&transform.unmap),
            filter_node(&transform.inner, pred, memo),
        ),
        Node::Sequence(left, right) => seq_node(
            filter_node(left, pred, memo),
            filter_node(right, pred, memo),
        ),
        Node::Concat(left, right) => concat_node(
            filter_node(left, pred, memo),
            filter_node(right, pred, memo),
        ),
        Node::Disjunction(left, right) => disjunction_node(
            filter_node(left, pred, memo),
            filter_node(right, pred, memo),
        ),
        Node::Recursive(rec) => {
            if let Some(parser) = memo.borrow().get(&rec.id) {
                return Rc::clone(&parser.node);
            }
            let source = Rc::clone(node);
            let pred = Rc::clone(pred);
            let thunk_memo = Rc::clone(memo);
            let filtered = recursive_from_thunk(Box::new(move || {
                let inner = match source.as_ref() {
                    Node::Recursive(rec) => Rc::clone(rec.force()),
                    _ => unreachable!(),
                };
                Parser {
                    node: filter_node(&inner, &pred, &thunk_memo),
                }
            }));
            memo.borrow_mut().insert(
                rec.id,
                Parser {
                    node: Rc::clone(&filtered),
                },
            );
            filtered
        }
    }
}

/*========================================*/
/*          Completion                    */
/*========================================*/

impl<T: Token> Parser<T> {
    /// Every way the input could be completed from here, shortest first.
    ///
    /// `samples` supplies concrete tokens per kind; kinds with no samples
    /// are not explored. Each completion is the result of feeding one
    /// sampled token sequence through the parse loop, so a
    /// [`ParseResult::Parsed`] item carries both the parsed value and the
    /// residual parser.
    pub fn completions(
        &self,
        samples: impl Fn(&T::Kind) -> Vec<T> + 'static,
    ) -> Completions<T> {
        let samples: Rc<dyn Fn(&T::Kind) -> Vec<T>> = Rc::new(samples);
        let sample_view = Rc::clone(&samples);
        let restricted = self.filter(move |kind| !(*sample_view)(kind).is_empty());
        Completions {
            parser: self.clone(),
            trails: restricted.trails(),
            samples,
            current: None,
        }
    }

    /// The shortest completion, if any exists within the sampled kinds.
    pub fn complete(
        &self,
        samples: impl Fn(&T::Kind) -> Vec<T> + 'static,
    ) -> Option<ParseResult<T>> {
        self.completions(samples).next()
    }
}

/// Iterator over completions; see [`Parser::completions`].
pub struct Completions<T: Token> {
    parser: Parser<T>,
    trails: Trails<T>,
    samples: Rc<dyn Fn(&T::Kind) -> Vec<T>>,
    current: Option<MultiProduct<std::vec::IntoIter<T>>>,
}

impl<T: Token> Iterator for Completions<T> {
    type Item = ParseResult<T>;

    fn next(&mut self) -> Option<ParseResult<T>> {
        loop {
            if let Some(product) = &mut self.current {
                if let Some(tokens) = product.next() {
                    return Some(self.parser.apply(tokens));
                }
                self.current = None;
            }
            let trail = self.trails.next()?;
            if trail.is_empty() {
                return Some(self.parser.apply(Vec::new()));
            }
            let samples = Rc::clone(&self.samples);
            self.current = Some(
                trail
                    .iter()
                    .map(|kind| (*samples)(kind))
                    .multi_cartesian_product(),
            );
        }
    }
}

/*========================================*/
/*          Test support                  */
/*========================================*/

#[cfg(test)]
pub(crate) mod tests_prelude {
    use crate::Token;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Tok {
        A,
        B,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) enum Kind {
        A,
        B,
    }

    impl Token for Tok {
        type Kind = Kind;

        fn kind(&self) -> Kind {
            match self {
                Tok::A => Kind::A,
                Tok::B => Kind::B,
            }
        }
    }
}
