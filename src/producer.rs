//! Lazy, memoized, duplicable sequences, ordered by a measure.
//!
//! A [`Producer`] enumerates items in non-decreasing measure order (for this
//! crate, the measure is always a sequence length). Internally it is a
//! cursor over a shared stream of *levels*: level `n` holds every item of
//! measure `n`, computed on demand and memoized. Duplicating a producer
//! clones the cursor and shares the levels, so already-computed items are
//! never recomputed.
//!
//! The level representation is what makes `union` and `product`
//! order-preserving: a union merges levelwise (left operand first), and a
//! product convolves levels (measures add), which is the diagonalization
//! over pairs. It is also what lets self-referential producers terminate:
//! a grammar loop reaches its own levels only at strictly smaller indices
//! whenever the loop consumes input, so each level is well-founded.
//! Reentrant requests for a level that is still being computed return the
//! empty level; such results are tainted and never memoized.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

#[cfg(feature = "flamegraphs")]
use no_nonsense_flamegraphs::span;

/*========================================*/
/*          Producer                      */
/*========================================*/

/// A lazily generated, restartable sequence of items in non-decreasing
/// measure order. Cloning yields an independent view over the same shared,
/// memoized computation.
pub(crate) struct Producer<A> {
    levels: Rc<Levels<A>>,
    level: usize,
    offset: usize,
}

impl<A> Clone for Producer<A> {
    fn clone(&self) -> Producer<A> {
        Producer {
            levels: Rc::clone(&self.levels),
            level: self.level,
            offset: self.offset,
        }
    }
}

impl<A: Clone + 'static> Producer<A> {
    fn from_source(source: Source<A>) -> Producer<A> {
        Producer {
            levels: Rc::new(Levels {
                source,
                memo: RefCell::new(Vec::new()),
                exhausted_after: Cell::new(None),
                in_progress: RefCell::new(HashSet::new()),
            }),
            level: 0,
            offset: 0,
        }
    }

    /// No items.
    pub(crate) fn empty() -> Producer<A> {
        Producer::from_source(Source::Empty)
    }

    /// Exactly one item, of the given measure.
    pub(crate) fn singleton(item: A, measure: usize) -> Producer<A> {
        Producer::from_source(Source::Singleton { item, measure })
    }

    /// All items of both producers, merged in measure order; within a
    /// level, `left`'s items come first.
    pub(crate) fn union(left: Producer<A>, right: Producer<A>) -> Producer<A> {
        Producer::from_source(Source::Union(left.levels, right.levels))
    }

    /// Measure-ordered union of any number of producers.
    pub(crate) fn union_all(producers: Vec<Producer<A>>) -> Producer<A> {
        let mut result = Producer::empty();
        for producer in producers {
            result = Producer::union(result, producer);
        }
        result
    }

    /// `join(x, y)` for every pair of items, in non-decreasing order of the
    /// joined measure (measures add under `join`).
    pub(crate) fn product(
        left: Producer<A>,
        right: Producer<A>,
        join: Rc<dyn Fn(&A, &A) -> A>,
    ) -> Producer<A> {
        Producer::from_source(Source::Product {
            left: left.levels,
            right: right.levels,
            join,
        })
    }

    /// A producer built on first use. This is the indirection that lets a
    /// recursive grammar's producer be registered in a memo table before the
    /// producer for its definition exists.
    pub(crate) fn lazily(thunk: Box<dyn FnOnce() -> Producer<A>>) -> Producer<A> {
        Producer::from_source(Source::Lazy(LazySource {
            thunk: RefCell::new(Some(thunk)),
            forced: OnceCell::new(),
        }))
    }

    /// An independent view over the same sequence, from the same position.
    pub(crate) fn duplicate(&self) -> Producer<A> {
        self.clone()
    }
}

impl<A: Clone + 'static> Iterator for Producer<A> {
    type Item = A;

    fn next(&mut self) -> Option<A> {
        #[cfg(feature = "flamegraphs")]
        span!("producer_next");

        loop {
            if let Some(bound) = self.levels.exhausted_after() {
                if self.level >= bound {
                    return None;
                }
            }
            let (items, _clean) = self.levels.level(self.level);
            if self.offset < items.len() {
                let item = items[self.offset].clone();
                self.offset += 1;
                return Some(item);
            }
            self.level += 1;
            self.offset = 0;
        }
    }
}

/*========================================*/
/*          Levels                        */
/*========================================*/

struct Levels<A> {
    source: Source<A>,
    /// Levels `0..memo.len()`, fully computed.
    memo: RefCell<Vec<Rc<Vec<A>>>>,
    /// When set to `n`: every level at index `n` or above is empty.
    exhausted_after: Cell<Option<usize>>,
    /// Levels currently being computed, for cycle breaking.
    in_progress: RefCell<HashSet<usize>>,
}

enum Source<A> {
    Empty,
    Singleton {
        item: A,
        measure: usize,
    },
    Union(Rc<Levels<A>>, Rc<Levels<A>>),
    Product {
        left: Rc<Levels<A>>,
        right: Rc<Levels<A>>,
        join: Rc<dyn Fn(&A, &A) -> A>,
    },
    Lazy(LazySource<A>),
}

struct LazySource<A> {
    thunk: RefCell<Option<Box<dyn FnOnce() -> Producer<A>>>>,
    forced: OnceCell<Rc<Levels<A>>>,
}

impl<A: Clone + 'static> LazySource<A> {
    fn force(&self) -> &Rc<Levels<A>> {
        self.forced.get_or_init(|| {
            let thunk = self
                .thunk
                .borrow_mut()
                .take()
                .expect("lazy producer forced during its own construction");
            thunk().levels
        })
    }
}

impl<A: Clone + 'static> Levels<A> {
    /// The items of level `n` and whether the computation was clean (free of
    /// reentrant cycle-breaking). Only clean levels are memoized.
    fn level(&self, n: usize) -> (Rc<Vec<A>>, bool) {
        if let Some(bound) = self.exhausted_after() {
            if n >= bound {
                return (Rc::new(Vec::new()), true);
            }
        }
        if let Some(items) = self.memo.borrow().get(n) {
            return (Rc::clone(items), true);
        }
        if self.in_progress.borrow().contains(&n) {
            return (Rc::new(Vec::new()), false);
        }

        self.in_progress.borrow_mut().insert(n);
        let (items, clean) = self.compute_level(n);
        self.in_progress.borrow_mut().remove(&n);

        let items = Rc::new(items);
        if clean {
            let mut memo = self.memo.borrow_mut();
            if memo.len() == n {
                memo.push(Rc::clone(&items));
            }
        }
        (items, clean)
    }

    fn compute_level(&self, n: usize) -> (Vec<A>, bool) {
        match &self.source {
            Source::Empty => (Vec::new(), true),
            Source::Singleton { item, measure } => {
                if n == *measure {
                    (vec![item.clone()], true)
                } else {
                    (Vec::new(), true)
                }
            }
            Source::Union(left, right) => {
                let (left_items, left_clean) = left.level(n);
                let (right_items, right_clean) = right.level(n);
                let mut items = left_items.as_ref().clone();
                items.extend(right_items.iter().cloned());
                (items, left_clean && right_clean)
            }
            Source::Product { left, right, join } => {
                let mut items = Vec::new();
                let mut clean = true;
                for i in 0..=n {
                    let (left_items, left_clean) = left.level(i);
                    clean &= left_clean;
                    if left_items.is_empty() {
                        // Skipping before touching the right side is what
                        // keeps self-referential products well-founded: a
                        // loop guarded by at least one token never asks for
                        // its own level at the index being computed.
                        continue;
                    }
                    let (right_items, right_clean) = right.level(n - i);
                    clean &= right_clean;
                    for x in left_items.iter() {
                        for y in right_items.iter() {
                            items.push((**join)(x, y));
                        }
                    }
                }
                (items, clean)
            }
            Source::Lazy(lazy) => {
                let (items, clean) = lazy.force().level(n);
                (items.as_ref().clone(), clean)
            }
        }
    }

    /// An upper bound past which all levels are empty, if one is known yet.
    /// Bounds propagate from leaves as levels are computed; a producer whose
    /// bound never resolves is one that keeps producing.
    fn exhausted_after(&self) -> Option<usize> {
        if let Some(bound) = self.exhausted_after.get() {
            return Some(bound);
        }
        let bound = match &self.source {
            Source::Empty => Some(0),
            Source::Singleton { measure, .. } => Some(measure + 1),
            Source::Union(left, right) => {
                match (left.exhausted_after(), right.exhausted_after()) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                }
            }
            Source::Product { left, right, .. } => {
                match (left.exhausted_after(), right.exhausted_after()) {
                    (Some(0), _) | (_, Some(0)) => Some(0),
                    (Some(a), Some(b)) => Some(a + b - 1),
                    _ => None,
                }
            }
            // Reads the cached field only: a recursive call here could chase
            // a grammar loop back into this very node.
            Source::Lazy(lazy) => lazy
                .forced
                .get()
                .and_then(|levels| levels.exhausted_after.get()),
        };
        if let Some(bound) = bound {
            self.exhausted_after.set(Some(bound));
        }
        bound
    }
}

/*========================================*/
/*          Tests                         */
/*========================================*/

#[cfg(test)]
fn collect(producer: Producer<Vec<u8>>, limit: usize) -> Vec<Vec<u8>> {
    producer.take(limit).collect()
}

#[cfg(test)]
fn join_concat() -> Rc<dyn Fn(&Vec<u8>, &Vec<u8>) -> Vec<u8>> {
    Rc::new(|a: &Vec<u8>, b: &Vec<u8>| {
        let mut joined = a.clone();
        joined.extend(b.iter().copied());
        joined
    })
}

#[test]
fn test_producer_basics() {
    assert_eq!(collect(Producer::empty(), 10), Vec::<Vec<u8>>::new());
    assert_eq!(collect(Producer::singleton(vec![1], 1), 10), vec![vec![1]]);

    let union = Producer::union(
        Producer::singleton(vec![1, 1], 2),
        Producer::singleton(vec![2], 1),
    );
    assert_eq!(collect(union, 10), vec![vec![2], vec![1, 1]]);

    let product = Producer::product(
        Producer::union(
            Producer::singleton(vec![], 0),
            Producer::singleton(vec![1], 1),
        ),
        Producer::singleton(vec![9], 1),
        join_concat(),
    );
    assert_eq!(collect(product, 10), vec![vec![9], vec![1, 9]]);
}

#[test]
fn test_producer_duplication() {
    let producer = Producer::union(
        Producer::singleton(vec![1], 1),
        Producer::singleton(vec![2], 1),
    );
    let mut first_view = producer.duplicate();
    assert_eq!(first_view.next(), Some(vec![1]));
    let mut second_view = first_view.duplicate();
    assert_eq!(first_view.next(), Some(vec![2]));
    assert_eq!(second_view.next(), Some(vec![2]));
    assert_eq!(first_view.next(), None);
    assert_eq!(second_view.next(), None);
}

#[test]
fn test_producer_self_reference() {
    // The producer for `many(elem)`: ε plus [1] prepended to itself.
    let slot: Rc<RefCell<Option<Producer<Vec<u8>>>>> = Rc::new(RefCell::new(None));
    let slot_view = Rc::clone(&slot);
    let self_view = Producer::lazily(Box::new(move || {
        slot_view.borrow().as_ref().expect("slot unset").duplicate()
    }));
    let producer = Producer::union(
        Producer::singleton(vec![], 0),
        Producer::product(Producer::singleton(vec![1], 1), self_view, join_concat()),
    );
    *slot.borrow_mut() = Some(producer.duplicate());

    assert_eq!(
        collect(producer, 4),
        vec![vec![], vec![1], vec![1, 1], vec![1, 1, 1]]
    );
}
