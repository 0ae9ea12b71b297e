//! The property engine: `nullable`, `productive`, `first`,
//! `should-not-follow`, `kinds`, and left-call detection, each computed by a
//! top-down walk over the term graph.
//!
//! Cycles are broken with a visited set of recursive identities: re-entering
//! a recursive node returns the property's least-fixed-point bottom (`None`,
//! `false`, or empty). The lattices are finite and every rule is monotone,
//! so one walk per query reaches the fixpoint. Entries through a recursive
//! node with an empty visited set are cached on the node.

use crate::term::{disjunction_node, seq_node, success_node, Node, RecId};
use crate::value::Value;
use crate::{Parser, Token};
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Kinds that must not appear immediately after a term, each mapped to a
/// witness parser accepting the tokens leading up to the ambiguity.
pub(crate) type SnfMap<T> = HashMap<<T as Token>::Kind, Parser<T>>;

/// Property caches for a recursive node. Filled only by queries that enter
/// the node with an empty visited set, so a cached value is always the true
/// fixpoint, never a cycle-base approximation.
pub(crate) struct Caches<T: Token> {
    nullable: OnceCell<Option<Value<T>>>,
    productive: OnceCell<bool>,
    first: OnceCell<HashSet<T::Kind>>,
    should_not_follow: OnceCell<SnfMap<T>>,
    kinds: OnceCell<HashSet<T::Kind>>,
    /// Whether the node re-enters itself without consuming a token.
    called_left: OnceCell<bool>,
}

impl<T: Token> Caches<T> {
    pub(crate) fn new() -> Caches<T> {
        Caches {
            nullable: OnceCell::new(),
            productive: OnceCell::new(),
            first: OnceCell::new(),
            should_not_follow: OnceCell::new(),
            kinds: OnceCell::new(),
            called_left: OnceCell::new(),
        }
    }
}

/*========================================*/
/*          Public entries                */
/*========================================*/

pub(crate) fn nullable<T: Token>(node: &Rc<Node<T>>) -> Option<Value<T>> {
    nullable_walk(node, &mut HashSet::new())
}

pub(crate) fn productive<T: Token>(node: &Rc<Node<T>>) -> bool {
    productive_walk(node, &mut HashSet::new())
}

pub(crate) fn first<T: Token>(node: &Rc<Node<T>>) -> HashSet<T::Kind> {
    first_walk(node, &mut HashSet::new())
}

pub(crate) fn should_not_follow<T: Token>(node: &Rc<Node<T>>) -> SnfMap<T> {
    snf_walk(node, &mut HashSet::new())
}

pub(crate) fn kinds<T: Token>(node: &Rc<Node<T>>) -> HashSet<T::Kind> {
    kinds_walk(node, &mut HashSet::new())
}

/// Does `kind` belong to `first(node)`? A membership-only walk, used by the
/// derivative to pick a disjunction side without building the full set.
pub(crate) fn has_first<T: Token>(node: &Rc<Node<T>>, kind: &T::Kind) -> bool {
    has_first_walk(node, kind, &mut HashSet::new())
}

/// Is this recursive node reachable from its own definition without
/// consuming a token? The defining test for left recursion; `false` for
/// non-recursive nodes.
pub(crate) fn is_left_recursive<T: Token>(node: &Rc<Node<T>>) -> bool {
    match node.as_ref() {
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.called_left.get() {
                return *cached;
            }
            let mut visited = HashSet::new();
            visited.insert(rec.id);
            let result = called_left_walk(rec.force(), rec.id, &mut visited);
            let _ = rec.caches.called_left.set(result);
            result
        }
        _ => false,
    }
}

/*========================================*/
/*          Walks                         */
/*========================================*/

fn nullable_walk<T: Token>(
    node: &Rc<Node<T>>,
    visited: &mut HashSet<RecId>,
) -> Option<Value<T>> {
    match node.as_ref() {
        Node::Success(value) => Some(value.clone()),
        Node::Failure => None,
        Node::Elem(_) => None,
        Node::Transform(transform) => {
            nullable_walk(&transform.inner, visited).map(|value| (*transform.map)(value))
        }
        Node::Sequence(left, right) => {
            let left_value = nullable_walk(left, visited)?;
            let right_value = nullable_walk(right, visited)?;
            Some(Value::pair(left_value, right_value))
        }
        Node::Concat(left, right) => {
            let left_value = nullable_walk(left, visited)?;
            let right_value = nullable_walk(right, visited)?;
            Some(left_value.seq_concat(&right_value))
        }
        Node::Disjunction(left, right) => {
            nullable_walk(left, visited).or_else(|| nullable_walk(right, visited))
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.nullable.get() {
                return cached.clone();
            }
            if visited.contains(&rec.id) {
                return None;
            }
            let cacheable = visited.is_empty();
            visited.insert(rec.id);
            let result = nullable_walk(rec.force(), visited);
            visited.remove(&rec.id);
            if cacheable {
                let _ = rec.caches.nullable.set(result.clone());
            }
            result
        }
    }
}

fn productive_walk<T: Token>(node: &Rc<Node<T>>, visited: &mut HashSet<RecId>) -> bool {
    match node.as_ref() {
        Node::Success(_) => true,
        Node::Failure => false,
        Node::Elem(_) => true,
        Node::Transform(transform) => productive_walk(&transform.inner, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            productive_walk(left, visited) && productive_walk(right, visited)
        }
        Node::Disjunction(left, right) => {
            productive_walk(left, visited) || productive_walk(right, visited)
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.productive.get() {
                return *cached;
            }
            if visited.contains(&rec.id) {
                return false;
            }
            let cacheable = visited.is_empty();
            visited.insert(rec.id);
            let result = productive_walk(rec.force(), visited);
            visited.remove(&rec.id);
            if cacheable {
                let _ = rec.caches.productive.set(result);
            }
            result
        }
    }
}

fn first_walk<T: Token>(node: &Rc<Node<T>>, visited: &mut HashSet<RecId>) -> HashSet<T::Kind> {
    match node.as_ref() {
        Node::Success(_) | Node::Failure => HashSet::new(),
        Node::Elem(kind) => {
            let mut set = HashSet::new();
            set.insert(kind.clone());
            set
        }
        Node::Transform(transform) => first_walk(&transform.inner, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            let mut set = first_walk(left, visited);
            if nullable(left).is_some() {
                set.extend(first_walk(right, visited));
            }
            set
        }
        Node::Disjunction(left, right) => {
            let mut set = first_walk(left, visited);
            set.extend(first_walk(right, visited));
            set
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.first.get() {
                return cached.clone();
            }
            if visited.contains(&rec.id) {
                return HashSet::new();
            }
            let cacheable = visited.is_empty();
            visited.insert(rec.id);
            let result = first_walk(rec.force(), visited);
            visited.remove(&rec.id);
            if cacheable {
                let _ = rec.caches.first.set(result.clone());
            }
            result
        }
    }
}

fn has_first_walk<T: Token>(
    node: &Rc<Node<T>>,
    kind: &T::Kind,
    visited: &mut HashSet<RecId>,
) -> bool {
    match node.as_ref() {
        Node::Success(_) | Node::Failure => false,
        Node::Elem(elem_kind) => elem_kind == kind,
        Node::Transform(transform) => has_first_walk(&transform.inner, kind, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            has_first_walk(left, kind, visited)
                || (nullable(left).is_some() && has_first_walk(right, kind, visited))
        }
        Node::Disjunction(left, right) => {
            has_first_walk(left, kind, visited) || has_first_walk(right, kind, visited)
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.first.get() {
                return cached.contains(kind);
            }
            if visited.contains(&rec.id) {
                return false;
            }
            visited.insert(rec.id);
            let result = has_first_walk(rec.force(), kind, visited);
            visited.remove(&rec.id);
            result
        }
    }
}

fn snf_walk<T: Token>(node: &Rc<Node<T>>, visited: &mut HashSet<RecId>) -> SnfMap<T> {
    match node.as_ref() {
        Node::Success(_) | Node::Failure | Node::Elem(_) => HashMap::new(),
        Node::Transform(transform) => snf_walk(&transform.inner, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            // A kind that must not follow `right` must not follow the whole
            // sequence, with `left` prepended to its witness prefix. When
            // `right` can finish empty, `left`'s own constraints surface too.
            let mut map = SnfMap::<T>::new();
            for (kind, witness) in snf_walk(right, visited) {
                let witness = Parser {
                    node: seq_node(Rc::clone(left), witness.node),
                };
                merge_snf_entry(&mut map, kind, witness);
            }
            if nullable(right).is_some() {
                for (kind, witness) in snf_walk(left, visited) {
                    merge_snf_entry(&mut map, kind, witness);
                }
            }
            map
        }
        Node::Disjunction(left, right) => {
            let mut map = snf_walk(left, visited);
            for (kind, witness) in snf_walk(right, visited) {
                merge_snf_entry(&mut map, kind, witness);
            }
            // A nullable side turns the other side's FIRST kinds into
            // must-not-follow kinds, witnessed by the empty prefix.
            if nullable(right).is_some() {
                for kind in first(left) {
                    merge_snf_entry(&mut map, kind, empty_witness());
                }
            }
            if nullable(left).is_some() {
                for kind in first(right) {
                    merge_snf_entry(&mut map, kind, empty_witness());
                }
            }
            map
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.should_not_follow.get() {
                return cached.clone();
            }
            if visited.contains(&rec.id) {
                return HashMap::new();
            }
            let cacheable = visited.is_empty();
            visited.insert(rec.id);
            let result = snf_walk(rec.force(), visited);
            visited.remove(&rec.id);
            if cacheable {
                let _ = rec.caches.should_not_follow.set(result.clone());
            }
            result
        }
    }
}

fn empty_witness<T: Token>() -> Parser<T> {
    Parser {
        node: success_node(Value::unit()),
    }
}

/// Witnesses for the same kind are merged by disjunction.
fn merge_snf_entry<T: Token>(map: &mut SnfMap<T>, kind: T::Kind, witness: Parser<T>) {
    match map.remove(&kind) {
        Some(existing) => {
            map.insert(
                kind,
                Parser {
                    node: disjunction_node(existing.node, witness.node),
                },
            );
        }
        None => {
            map.insert(kind, witness);
        }
    }
}

fn kinds_walk<T: Token>(node: &Rc<Node<T>>, visited: &mut HashSet<RecId>) -> HashSet<T::Kind> {
    match node.as_ref() {
        Node::Success(_) | Node::Failure => HashSet::new(),
        Node::Elem(kind) => {
            let mut set = HashSet::new();
            set.insert(kind.clone());
            set
        }
        Node::Transform(transform) => kinds_walk(&transform.inner, visited),
        Node::Sequence(left, right)
        | Node::Concat(left, right)
        | Node::Disjunction(left, right) => {
            let mut set = kinds_walk(left, visited);
            set.extend(kinds_walk(right, visited));
            set
        }
        Node::Recursive(rec) => {
            if let Some(cached) = rec.caches.kinds.get() {
                return cached.clone();
            }
            if visited.contains(&rec.id) {
                return HashSet::new();
            }
            let cacheable = visited.is_empty();
            visited.insert(rec.id);
            let result = kinds_walk(rec.force(), visited);
            visited.remove(&rec.id);
            if cacheable {
                let _ = rec.caches.kinds.set(result.clone());
            }
            result
        }
    }
}

fn called_left_walk<T: Token>(
    node: &Rc<Node<T>>,
    target: RecId,
    visited: &mut HashSet<RecId>,
) -> bool {
    match node.as_ref() {
        Node::Success(_) | Node::Failure | Node::Elem(_) => false,
        Node::Transform(transform) => called_left_walk(&transform.inner, target, visited),
        Node::Sequence(left, right) | Node::Concat(left, right) => {
            called_left_walk(left, target, visited)
                || (nullable(left).is_some() && called_left_walk(right, target, visited))
        }
        Node::Disjunction(left, right) => {
            called_left_walk(left, target, visited)
                || called_left_walk(right, target, visited)
        }
        Node::Recursive(rec) => {
            if rec.id == target {
                return true;
            }
            if visited.contains(&rec.id) {
                return false;
            }
            visited.insert(rec.id);
            let result = called_left_walk(rec.force(), target, visited);
            visited.remove(&rec.id);
            result
        }
    }
}

#[test]
fn test_properties() {
    use crate::tests_prelude::{Kind, Tok};
    use crate::{elem, failure, recursive, succeed};

    let a = elem::<Tok>(Kind::A);
    assert_eq!(a.nullable(), None);
    assert!(a.is_productive());
    assert_eq!(a.first(), HashSet::from([Kind::A]));

    let ab = a.and(&elem(Kind::B));
    assert_eq!(ab.first(), HashSet::from([Kind::A]));
    assert_eq!(ab.kinds(), HashSet::from([Kind::A, Kind::B]));

    let opt_a = elem::<Tok>(Kind::A).or(&succeed(Value::unit()));
    assert!(opt_a.nullable().is_some());
    assert_eq!(
        opt_a.should_not_follow().keys().cloned().collect::<HashSet<_>>(),
        HashSet::from([Kind::A])
    );

    // many(elem(A)): nullable, productive, first = {A}, terminates.
    let many_a = recursive::<Tok>(|rec| {
        succeed(Value::empty_seq()).or(&elem(Kind::A).prepend(&rec))
    });
    assert_eq!(many_a.nullable(), Some(Value::empty_seq()));
    assert!(many_a.is_productive());
    assert_eq!(many_a.first(), HashSet::from([Kind::A]));
    assert_eq!(
        many_a.should_not_follow().keys().cloned().collect::<HashSet<_>>(),
        HashSet::from([Kind::A])
    );

    assert!(!failure::<Tok>().is_productive());
    assert_eq!(failure::<Tok>().first(), HashSet::new());
}
