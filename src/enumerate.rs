//! Trail enumeration and inverse parsing.
//!
//! A *trail* is one accepted input, abstracted to its sequence of kinds.
//! [`trails`] enumerates every trail of a term, shortest first; [`tokens`]
//! runs parsing backwards, enumerating the token sequences that would parse
//! to a given target value, using each transform's inverse.
//!
//! Recursive nodes are handled with a per-query memo table: a lazy producer
//! is registered under the node's identity *before* the producer for its
//! definition is built, so self-references resolve to an independent
//! duplicate of the shared producer instead of expanding the loop eagerly.

use crate::analysis;
use crate::producer::Producer;
use crate::term::{Node, RecId};
use crate::value::Value;
use crate::Token;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/*========================================*/
/*          Trails                        */
/*========================================*/

/// All kind-sequences accepted by a parser, in non-decreasing length order.
/// Returned by [`crate::Parser::trails`]. Cloning yields an independent iterator
/// sharing the already-enumerated prefix.
#[derive(Clone)]
pub struct Trails<T: Token> {
    producer: Producer<Vec<T::Kind>>,
}

impl<T: Token> Iterator for Trails<T> {
    type Item = Vec<T::Kind>;

    fn next(&mut self) -> Option<Vec<T::Kind>> {
        self.producer.next()
    }
}

/// Token sequences that parse to a target value, in non-decreasing length
/// order. Returned by [`crate::Parser::tokens_of`].
#[derive(Clone)]
pub struct TokenSequences<T: Token> {
    producer: Producer<Vec<T>>,
}

impl<T: Token> Iterator for TokenSequences<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        self.producer.next()
    }
}

pub(crate) fn trails<T: Token>(node: &Rc<Node<T>>) -> Trails<T> {
    let memo = Rc::new(RefCell::new(HashMap::new()));
    Trails {
        producer: trails_node(node, &memo),
    }
}

pub(crate) fn tokens<T: Token>(node: &Rc<Node<T>>, target: &Value<T>) -> TokenSequences<T> {
    let memo = Rc::new(RefCell::new(HashMap::new()));
    TokenSequences {
        producer: tokens_node(node, target, &memo),
    }
}

fn concat_join<X: Clone>() -> Rc<dyn Fn(&Vec<X>, &Vec<X>) -> Vec<X>> {
    Rc::new(|front: &Vec<X>, back: &Vec<X>| {
        let mut joined = front.clone();
        joined.extend(back.iter().cloned());
        joined
    })
}

/*========================================*/
/*          Trail producers               */
/*========================================*/

type TrailMemo<T> = Rc<RefCell<HashMap<RecId, Producer<Vec<<T as Token>::Kind>>>>>;

fn trails_node<T: Token>(node: &Rc<Node<T>>, memo: &TrailMemo<T>) -> Producer<Vec<T::Kind>> {
    // Dead subterms get the empty producer up front. This is what lets a
    // finite language report exhaustion instead of scanning ever-longer,
    // ever-empty levels.
    if !analysis::productive(node) {
        return Producer::empty();
    }
    match node.as_ref() {
        Node::Success(_) => Producer::singleton(Vec::new(), 0),
        Node::Failure => Producer::empty(),
        Node::Elem(kind) => Producer::singleton(vec![kind.clone()], 1),
        Node::Transform(transform) => trails_node(&transform.inner, memo),
        Node::Sequence(left, right) | Node::Concat(left, right) => Producer::product(
            trails_node(left, memo),
            trails_node(right, memo),
            concat_join(),
        ),
        Node::Disjunction(left, right) => {
            Producer::union(trails_node(left, memo), trails_node(right, memo))
        }
        Node::Recursive(rec) => {
            if let Some(producer) = memo.borrow().get(&rec.id) {
                return producer.duplicate();
            }
            let slot: Rc<RefCell<Option<Producer<Vec<T::Kind>>>>> =
                Rc::new(RefCell::new(None));
            let slot_view = Rc::clone(&slot);
            let producer = Producer::lazily(Box::new(move || {
                slot_view
                    .borrow()
                    .as_ref()
                    .expect("recursive trail producer consumed before its definition")
                    .duplicate()
            }));
            memo.borrow_mut().insert(rec.id, producer.duplicate());
            let inner = trails_node(rec.force(), memo);
            *slot.borrow_mut() = Some(inner);
            producer
        }
    }
}

/*========================================*/
/*          Token producers               */
/*========================================*/

// Values are comparable but not hashable, so the memo for a recursive node
// is an association list over targets.
type TokenMemo<T> = Rc<RefCell<HashMap<RecId, Vec<(Value<T>, Producer<Vec<T>>)>>>>;

fn tokens_node<T: Token>(
    node: &Rc<Node<T>>,
    target: &Value<T>,
    memo: &TokenMemo<T>,
) -> Producer<Vec<T>> {
    if !analysis::productive(node) {
        return Producer::empty();
    }
    match node.as_ref() {
        Node::Success(value) => {
            if value == target {
                Producer::singleton(Vec::new(), 0)
            } else {
                Producer::empty()
            }
        }
        Node::Failure => Producer::empty(),
        Node::Elem(kind) => match target.as_token() {
            Some(token) if &token.kind() == kind => {
                Producer::singleton(vec![token.clone()], 1)
            }
            _ => Producer::empty(),
        },
        Node::Transform(transform) => {
            let candidates = (*transform.unmap)(target);
            Producer::union_all(
                candidates
                    .iter()
                    .map(|candidate| tokens_node(&transform.inner, candidate, memo))
                    .collect(),
            )
        }
        Node::Sequence(left, right) => match target.as_pair() {
            Some((first, second)) => Producer::product(
                tokens_node(left, first, memo),
                tokens_node(right, second, memo),
                concat_join(),
            ),
            None => Producer::empty(),
        },
        Node::Concat(left, right) => match target.as_seq() {
            // The target sequence could have been split anywhere between the
            // two sides; union over every split point.
            Some(items) => {
                let splits = (0..=items.len())
                    .map(|split| {
                        let front = Value::seq(items[..split].to_vec());
                        let back = Value::seq(items[split..].to_vec());
                        Producer::product(
                            tokens_node(left, &front, memo),
                            tokens_node(right, &back, memo),
                            concat_join(),
                        )
                    })
                    .collect();
                Producer::union_all(splits)
            }
            None => Producer::empty(),
        },
        Node::Disjunction(left, right) => Producer::union(
            tokens_node(left, target, memo),
            tokens_node(right, target, memo),
        ),
        Node::Recursive(rec) => {
            if let Some(entries) = memo.borrow().get(&rec.id) {
                if let Some((_, producer)) =
                    entries.iter().find(|(value, _)| value == target)
                {
                    return producer.duplicate();
                }
            }
            let slot: Rc<RefCell<Option<Producer<Vec<T>>>>> = Rc::new(RefCell::new(None));
            let slot_view = Rc::clone(&slot);
            let producer = Producer::lazily(Box::new(move || {
                slot_view
                    .borrow()
                    .as_ref()
                    .expect("recursive token producer consumed before its definition")
                    .duplicate()
            }));
            memo.borrow_mut()
                .entry(rec.id)
                .or_default()
                .push((target.clone(), producer.duplicate()));
            let inner = tokens_node(rec.force(), target, memo);
            *slot.borrow_mut() = Some(inner);
            producer
        }
    }
}
