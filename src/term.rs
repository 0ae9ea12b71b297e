use crate::analysis::{self, Caches};
use crate::value::Value;
use crate::{Parser, Token};
use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "flamegraphs")]
use no_nonsense_flamegraphs::span;

/*========================================*/
/*          Term graph                    */
/*========================================*/

/// Identity of a recursive node. Fresh identities come from a global
/// monotone counter; equality and hashing of recursive nodes go through
/// this identity, never through structure.
pub(crate) type RecId = u64;

static NEXT_REC_ID: AtomicU64 = AtomicU64::new(0);

/// One node of the term graph. `Recursive` is the only variant that can
/// introduce a cycle; everything else refers to already-built subterms.
pub(crate) enum Node<T: Token> {
    Success(Value<T>),
    Failure,
    Elem(T::Kind),
    Transform(Transform<T>),
    Sequence(Rc<Node<T>>, Rc<Node<T>>),
    Concat(Rc<Node<T>>, Rc<Node<T>>),
    Disjunction(Rc<Node<T>>, Rc<Node<T>>),
    Recursive(RecNode<T>),
}

pub(crate) struct Transform<T: Token> {
    pub(crate) map: Rc<dyn Fn(Value<T>) -> Value<T>>,
    /// Maps a target output value to the candidate inner values that `map`
    /// would send to it. Defaults to "no candidates".
    pub(crate) unmap: Rc<dyn Fn(&Value<T>) -> Vec<Value<T>>>,
    pub(crate) inner: Rc<Node<T>>,
}

/// A recursive node: an identity plus a lazily forced inner term.
///
/// The thunk is taken exactly once, on first observation; afterwards the
/// inner term lives in the `OnceCell`. The inner term typically refers back
/// to this node through a strong `Rc`, so cyclic grammars keep themselves
/// alive.
pub(crate) struct RecNode<T: Token> {
    pub(crate) id: RecId,
    thunk: RefCell<Option<Box<dyn FnOnce() -> Parser<T>>>>,
    inner: OnceCell<Rc<Node<T>>>,
    pub(crate) caches: Caches<T>,
}

impl<T: Token> RecNode<T> {
    pub(crate) fn force(&self) -> &Rc<Node<T>> {
        self.inner.get_or_init(|| {
            let thunk = self
                .thunk
                .borrow_mut()
                .take()
                .expect("recursive parser forced during its own construction");
            thunk().node
        })
    }
}

/*========================================*/
/*          Construction                  */
/*========================================*/

// The constructors below perform the normalizations the analyses assume:
// success fusion, failure short-circuits, failure-identity disjunction, and
// right-leaning concatenation.

pub(crate) fn success_node<T: Token>(value: Value<T>) -> Rc<Node<T>> {
    Rc::new(Node::Success(value))
}

pub(crate) fn failure_node<T: Token>() -> Rc<Node<T>> {
    Rc::new(Node::Failure)
}

pub(crate) fn elem_node<T: Token>(kind: T::Kind) -> Rc<Node<T>> {
    Rc::new(Node::Elem(kind))
}

pub(crate) fn transform_node<T: Token>(
    map: Rc<dyn Fn(Value<T>) -> Value<T>>,
    unmap: Rc<dyn Fn(&Value<T>) -> Vec<Value<T>>>,
    inner: Rc<Node<T>>,
) -> Rc<Node<T>> {
    match inner.as_ref() {
        Node::Failure => failure_node(),
        _ => Rc::new(Node::Transform(Transform { map, unmap, inner })),
    }
}

pub(crate) fn seq_node<T: Token>(left: Rc<Node<T>>, right: Rc<Node<T>>) -> Rc<Node<T>> {
    match (left.as_ref(), right.as_ref()) {
        (Node::Failure, _) | (_, Node::Failure) => failure_node(),
        (Node::Success(a), Node::Success(b)) => {
            success_node(Value::pair(a.clone(), b.clone()))
        }
        _ => Rc::new(Node::Sequence(left, right)),
    }
}

pub(crate) fn concat_node<T: Token>(left: Rc<Node<T>>, right: Rc<Node<T>>) -> Rc<Node<T>> {
    match (left.as_ref(), right.as_ref()) {
        (Node::Failure, _) | (_, Node::Failure) => failure_node(),
        (Node::Success(a), Node::Success(b)) => success_node(a.seq_concat(b)),
        // Rebalance `(l ++ m) ++ r` into `l ++ (m ++ r)` so that building a
        // sequence by left-accumulation stays linear.
        (Node::Concat(inner_left, inner_right), _) => {
            let inner_left = Rc::clone(inner_left);
            let inner_right = Rc::clone(inner_right);
            concat_node(inner_left, concat_node(inner_right, right))
        }
        _ => Rc::new(Node::Concat(left, right)),
    }
}

pub(crate) fn disjunction_node<T: Token>(left: Rc<Node<T>>, right: Rc<Node<T>>) -> Rc<Node<T>> {
    match (left.as_ref(), right.as_ref()) {
        (Node::Failure, _) => right,
        (_, Node::Failure) => left,
        _ => Rc::new(Node::Disjunction(left, right)),
    }
}

/// A recursive node whose inner term is produced by `thunk`, deferred until
/// first observation. Used directly by `filter`, which resolves
/// self-references through its own memo table rather than a handle.
pub(crate) fn recursive_from_thunk<T: Token>(
    thunk: Box<dyn FnOnce() -> Parser<T>>,
) -> Rc<Node<T>> {
    Rc::new(Node::Recursive(RecNode {
        id: NEXT_REC_ID.fetch_add(1, Ordering::Relaxed),
        thunk: RefCell::new(Some(thunk)),
        inner: OnceCell::new(),
        caches: Caches::new(),
    }))
}

/// A recursive node whose definition may refer back to the node itself via
/// the handle passed to `f`.
pub(crate) fn recursive_node<T: Token>(
    f: impl FnOnce(Parser<T>) -> Parser<T> + 'static,
) -> Rc<Node<T>> {
    let node = Rc::new(Node::Recursive(RecNode {
        id: NEXT_REC_ID.fetch_add(1, Ordering::Relaxed),
        thunk: RefCell::new(None),
        inner: OnceCell::new(),
        caches: Caches::new(),
    }));
    let handle = Parser {
        node: Rc::clone(&node),
    };
    match node.as_ref() {
        Node::Recursive(rec) => {
            *rec.thunk.borrow_mut() = Some(Box::new(move || f(handle)));
        }
        _ => unreachable!(),
    }
    node
}

/*========================================*/
/*          Derivative                    */
/*========================================*/

/// The residual term after consuming `token` of kind `kind`.
pub(crate) fn derive<T: Token>(node: &Rc<Node<T>>, token: &T, kind: &T::Kind) -> Rc<Node<T>> {
    #[cfg(feature = "flamegraphs")]
    span!("derive");

    derive_walk(node, token, kind, &mut HashSet::new())
}

// The visited set only matters for left-recursive grammars, whose semantics
// are unspecified: re-entering a recursive node without having consumed the
// token derives to failure instead of recursing forever.
fn derive_walk<T: Token>(
    node: &Rc<Node<T>>,
    token: &T,
    kind: &T::Kind,
    visited: &mut HashSet<RecId>,
) -> Rc<Node<T>> {
    match node.as_ref() {
        Node::Success(_) | Node::Failure => failure_node(),
        Node::Elem(elem_kind) => {
            if elem_kind == kind {
                success_node(Value::token(token.clone()))
            } else {
                failure_node()
            }
        }
        Node::Transform(transform) => transform_node(
            Rc::clone(&transform.map),
            Rc::clone(&transform.unmap),
            derive_walk(&transform.inner, token, kind, visited),
        ),
        Node::Sequence(left, right) => {
            let left_residual = derive_walk(left, token, kind, visited);
            if analysis::productive(&left_residual) {
                seq_node(left_residual, Rc::clone(right))
            } else if let Some(value) = analysis::nullable(left) {
                seq_node(success_node(value), derive_walk(right, token, kind, visited))
            } else {
                failure_node()
            }
        }
        Node::Concat(left, right) => {
            let left_residual = derive_walk(left, token, kind, visited);
            if analysis::productive(&left_residual) {
                concat_node(left_residual, Rc::clone(right))
            } else if let Some(value) = analysis::nullable(left) {
                concat_node(
                    success_node(value),
                    derive_walk(right, token, kind, visited),
                )
            } else {
                failure_node()
            }
        }
        // Only the side whose FIRST set contains `kind` is derived. Ties go
        // to the left side, so a nullable right branch never shadows a left
        // branch that can actually consume the token.
        Node::Disjunction(left, right) => {
            if analysis::has_first(left, kind) {
                derive_walk(left, token, kind, visited)
            } else {
                derive_walk(right, token, kind, visited)
            }
        }
        Node::Recursive(rec) => {
            if visited.contains(&rec.id) {
                return failure_node();
            }
            visited.insert(rec.id);
            let result = derive_walk(rec.force(), token, kind, visited);
            visited.remove(&rec.id);
            result
        }
    }
}

/*========================================*/
/*          Identity & display            */
/*========================================*/

impl<T: Token> PartialEq for Parser<T> {
    fn eq(&self, other: &Parser<T>) -> bool {
        match (self.node.as_ref(), other.node.as_ref()) {
            (Node::Recursive(a), Node::Recursive(b)) => a.id == b.id,
            _ => Rc::ptr_eq(&self.node, &other.node),
        }
    }
}

impl<T: Token> Eq for Parser<T> {}

impl<T: Token> Hash for Parser<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.node.as_ref() {
            Node::Recursive(rec) => rec.id.hash(state),
            _ => (Rc::as_ptr(&self.node) as usize).hash(state),
        }
    }
}

impl<T: Token> fmt::Debug for Parser<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut seen = HashSet::new();
        fmt_node(&self.node, f, &mut seen)
    }
}

fn fmt_node<T: Token>(
    node: &Rc<Node<T>>,
    f: &mut fmt::Formatter,
    seen: &mut HashSet<RecId>,
) -> fmt::Result {
    match node.as_ref() {
        Node::Success(_) => write!(f, "success"),
        Node::Failure => write!(f, "failure"),
        Node::Elem(kind) => write!(f, "elem({:?})", kind),
        Node::Transform(transform) => {
            write!(f, "map(")?;
            fmt_node(&transform.inner, f, seen)?;
            write!(f, ")")
        }
        Node::Sequence(left, right) => {
            write!(f, "(")?;
            fmt_node(left, f, seen)?;
            write!(f, " ~ ")?;
            fmt_node(right, f, seen)?;
            write!(f, ")")
        }
        Node::Concat(left, right) => {
            write!(f, "(")?;
            fmt_node(left, f, seen)?;
            write!(f, " ++ ")?;
            fmt_node(right, f, seen)?;
            write!(f, ")")
        }
        Node::Disjunction(left, right) => {
            write!(f, "(")?;
            fmt_node(left, f, seen)?;
            write!(f, " | ")?;
            fmt_node(right, f, seen)?;
            write!(f, ")")
        }
        Node::Recursive(rec) => {
            if seen.insert(rec.id) {
                write!(f, "rec#{}[", rec.id)?;
                match rec.inner.get() {
                    Some(inner) => fmt_node(inner, f, seen)?,
                    None => write!(f, "<unforced>")?,
                }
                write!(f, "]")
            } else {
                write!(f, "rec#{}", rec.id)
            }
        }
    }
}
