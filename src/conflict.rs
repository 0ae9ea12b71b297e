use crate::analysis::{self, SnfMap};
use crate::term::{disjunction_node, seq_node, success_node, Node, RecId};
use crate::value::Value;
use crate::{Parser, Token};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

/*========================================*/
/*          Conflicts                     */
/*========================================*/

/// A way in which a grammar fails to be LL(1).
///
/// Conflicts are data, returned by [`Parser::conflicts`]; nothing raises
/// them. Each carries a `prefix` parser accepting the token sequences that
/// lead up to the ambiguity (enumerate its trails for concrete witnesses)
/// and the offending subterm.
pub enum Conflict<T: Token> {
    /// Both alternatives of a disjunction accept the empty input.
    AmbiguityOnEmpty {
        prefix: Parser<T>,
        disjunction: Parser<T>,
    },
    /// Both alternatives of a disjunction accept inputs starting with the
    /// same kinds.
    AmbiguityOnFirst {
        prefix: Parser<T>,
        kinds: HashSet<T::Kind>,
        disjunction: Parser<T>,
    },
    /// Kinds that could either continue the left side of a sequence or
    /// start its right side.
    AmbiguityOnFollow {
        prefix: Parser<T>,
        kinds: HashSet<T::Kind>,
        sequence: Parser<T>,
    },
    /// A recursive parser that re-enters itself without consuming a token.
    LeftRecursion {
        prefix: Parser<T>,
        parser: Parser<T>,
    },
}

impl<T: Token> Conflict<T> {
    /// The tokens leading up to the ambiguity.
    pub fn prefix(&self) -> &Parser<T> {
        match self {
            Conflict::AmbiguityOnEmpty { prefix, .. } => prefix,
            Conflict::AmbiguityOnFirst { prefix, .. } => prefix,
            Conflict::AmbiguityOnFollow { prefix, .. } => prefix,
            Conflict::LeftRecursion { prefix, .. } => prefix,
        }
    }

    /// The subterm the conflict was found in.
    pub fn source(&self) -> &Parser<T> {
        match self {
            Conflict::AmbiguityOnEmpty { disjunction, .. } => disjunction,
            Conflict::AmbiguityOnFirst { disjunction, .. } => disjunction,
            Conflict::AmbiguityOnFollow { sequence, .. } => sequence,
            Conflict::LeftRecursion { parser, .. } => parser,
        }
    }

    /// The same conflict, reported from one level further out: `parser` is
    /// parsed before the current prefix.
    fn with_prefix(self, parser: &Rc<Node<T>>) -> Conflict<T> {
        let extend = |prefix: Parser<T>| Parser {
            node: seq_node(Rc::clone(parser), prefix.node),
        };
        match self {
            Conflict::AmbiguityOnEmpty {
                prefix,
                disjunction,
            } => Conflict::AmbiguityOnEmpty {
                prefix: extend(prefix),
                disjunction,
            },
            Conflict::AmbiguityOnFirst {
                prefix,
                kinds,
                disjunction,
            } => Conflict::AmbiguityOnFirst {
                prefix: extend(prefix),
                kinds,
                disjunction,
            },
            Conflict::AmbiguityOnFollow {
                prefix,
                kinds,
                sequence,
            } => Conflict::AmbiguityOnFollow {
                prefix: extend(prefix),
                kinds,
                sequence,
            },
            Conflict::LeftRecursion { prefix, parser } => Conflict::LeftRecursion {
                prefix: extend(prefix),
                parser,
            },
        }
    }
}

fn empty_prefix<T: Token>() -> Parser<T> {
    Parser {
        node: success_node(Value::unit()),
    }
}

/*========================================*/
/*          LL(1) check                   */
/*========================================*/

pub(crate) fn is_ll1<T: Token>(node: &Rc<Node<T>>) -> bool {
    is_ll1_walk(node, &mut HashSet::new())
}

fn is_ll1_walk<T: Token>(node: &Rc<Node<T>>, visited: &mut HashSet<RecId>) -> bool {
    match node.as_ref() {
        Node::Success(_) | Node::Failure | Node::Elem(_) => true,
        Node::Transform(transform) => is_ll1_walk(&transform.inner, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            is_ll1_walk(left, visited)
                && is_ll1_walk(right, visited)
                && follow_overlap(left, right).is_empty()
        }
        Node::Disjunction(left, right) => {
            is_ll1_walk(left, visited)
                && is_ll1_walk(right, visited)
                && !(analysis::nullable(left).is_some() && analysis::nullable(right).is_some())
                && first_overlap(left, right).is_empty()
        }
        Node::Recursive(rec) => {
            if visited.contains(&rec.id) {
                return true;
            }
            if analysis::is_left_recursive(node) {
                return false;
            }
            visited.insert(rec.id);
            let result = is_ll1_walk(rec.force(), visited);
            visited.remove(&rec.id);
            result
        }
    }
}

fn first_overlap<T: Token>(left: &Rc<Node<T>>, right: &Rc<Node<T>>) -> HashSet<T::Kind> {
    let left_first = analysis::first(left);
    analysis::first(right)
        .into_iter()
        .filter(|kind| left_first.contains(kind))
        .collect()
}

fn follow_overlap<T: Token>(left: &Rc<Node<T>>, right: &Rc<Node<T>>) -> HashSet<T::Kind> {
    let snf = analysis::should_not_follow(left);
    analysis::first(right)
        .into_iter()
        .filter(|kind| snf.contains_key(kind))
        .collect()
}

/*========================================*/
/*          Conflict enumeration          */
/*========================================*/

pub(crate) fn conflicts<T: Token>(node: &Rc<Node<T>>) -> Vec<Conflict<T>> {
    let mut out = Vec::new();
    conflicts_walk(node, &mut HashSet::new(), &mut out);
    out
}

fn conflicts_walk<T: Token>(
    node: &Rc<Node<T>>,
    visited: &mut HashSet<RecId>,
    out: &mut Vec<Conflict<T>>,
) {
    match node.as_ref() {
        Node::Success(_) | Node::Failure | Node::Elem(_) => {}
        Node::Transform(transform) => conflicts_walk(&transform.inner, visited, out),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            conflicts_walk(left, visited, out);

            // Conflicts inside the right side happen after the left side has
            // been parsed, so its prefix grows by `left`.
            let mut right_conflicts = Vec::new();
            conflicts_walk(right, visited, &mut right_conflicts);
            out.extend(
                right_conflicts
                    .into_iter()
                    .map(|conflict| conflict.with_prefix(left)),
            );

            let kinds = follow_overlap(left, right);
            if !kinds.is_empty() {
                out.push(Conflict::AmbiguityOnFollow {
                    prefix: follow_witness(&analysis::should_not_follow(left), &kinds),
                    kinds,
                    sequence: Parser {
                        node: Rc::clone(node),
                    },
                });
            }
        }
        Node::Disjunction(left, right) => {
            conflicts_walk(left, visited, out);
            conflicts_walk(right, visited, out);

            if analysis::nullable(left).is_some() && analysis::nullable(right).is_some() {
                out.push(Conflict::AmbiguityOnEmpty {
                    prefix: empty_prefix(),
                    disjunction: Parser {
                        node: Rc::clone(node),
                    },
                });
            }
            let kinds = first_overlap(left, right);
            if !kinds.is_empty() {
                out.push(Conflict::AmbiguityOnFirst {
                    prefix: empty_prefix(),
                    kinds,
                    disjunction: Parser {
                        node: Rc::clone(node),
                    },
                });
            }
        }
        Node::Recursive(rec) => {
            if visited.contains(&rec.id) {
                return;
            }
            if analysis::is_left_recursive(node) {
                out.push(Conflict::LeftRecursion {
                    prefix: empty_prefix(),
                    parser: Parser {
                        node: Rc::clone(node),
                    },
                });
            }
            visited.insert(rec.id);
            conflicts_walk(rec.force(), visited, out);
            visited.remove(&rec.id);
        }
    }
}

/// The prefix of a follow conflict is drawn from the should-not-follow
/// witnesses of the ambiguous kinds, merged by disjunction.
fn follow_witness<T: Token>(snf: &SnfMap<T>, kinds: &HashSet<T::Kind>) -> Parser<T> {
    let mut witness: Option<Parser<T>> = None;
    for kind in kinds {
        if let Some(parser) = snf.get(kind) {
            witness = Some(match witness {
                None => parser.clone(),
                Some(merged) => Parser {
                    node: disjunction_node(merged.node, parser.node.clone()),
                },
            });
        }
    }
    witness.unwrap_or_else(empty_prefix)
}

/*========================================*/
/*          Display                       */
/*========================================*/

impl<T: Token> fmt::Display for Conflict<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use colored::Colorize;

        let message = match self {
            Conflict::AmbiguityOnEmpty { disjunction, .. } => {
                format!(
                    "in {:?}, both alternatives could be empty",
                    disjunction
                )
            }
            Conflict::AmbiguityOnFirst {
                kinds, disjunction, ..
            } => {
                format!(
                    "in {:?}, tokens of kinds {:?} could start either alternative",
                    disjunction,
                    sorted_debug(kinds)
                )
            }
            Conflict::AmbiguityOnFollow {
                kinds, sequence, ..
            } => {
                format!(
                    "in {:?}, tokens of kinds {:?} could either continue the left side or start the right side",
                    sequence,
                    sorted_debug(kinds)
                )
            }
            Conflict::LeftRecursion { parser, .. } => {
                format!("{:?} re-enters itself without consuming a token", parser)
            }
        };
        write!(
            f,
            "{}{} {}",
            "ambiguous grammar".red().bold(),
            ":".bold(),
            message.bold()
        )
    }
}

// Kind sets print in a stable order so error output is deterministic.
fn sorted_debug<K: fmt::Debug>(kinds: &HashSet<K>) -> Vec<String> {
    let mut names: Vec<String> = kinds.iter().map(|kind| format!("{:?}", kind)).collect();
    names.sort();
    names
}

impl<T: Token> fmt::Debug for Conflict<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Conflict::AmbiguityOnEmpty {
                prefix,
                disjunction,
            } => f
                .debug_struct("AmbiguityOnEmpty")
                .field("prefix", prefix)
                .field("disjunction", disjunction)
                .finish(),
            Conflict::AmbiguityOnFirst {
                prefix,
                kinds,
                disjunction,
            } => f
                .debug_struct("AmbiguityOnFirst")
                .field("prefix", prefix)
                .field("kinds", &sorted_debug(kinds))
                .field("disjunction", disjunction)
                .finish(),
            Conflict::AmbiguityOnFollow {
                prefix,
                kinds,
                sequence,
            } => f
                .debug_struct("AmbiguityOnFollow")
                .field("prefix", prefix)
                .field("kinds", &sorted_debug(kinds))
                .field("sequence", sequence)
                .finish(),
            Conflict::LeftRecursion { prefix, parser } => f
                .debug_struct("LeftRecursion")
                .field("prefix", prefix)
                .field("parser", parser)
                .finish(),
        }
    }
}

impl<T: Token> Error for Conflict<T> {}
