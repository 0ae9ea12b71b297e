use crate::Token;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/*========================================*/
/*          Value                         */
/*========================================*/

/// The value produced by a parser.
///
/// Per-node value types are erased: every term produces a `Value`, and
/// [`Parser::map`](crate::Parser::map) re-establishes concrete types at the
/// boundary by inspecting the `Value` it is handed.
///
/// - `Unit` is produced by [`void`](crate::Parser::void) and friends.
/// - `Token` is produced by [`elem`](crate::elem): the token that was consumed.
/// - `Pair` is produced by [`and`](crate::Parser::and). It is a dedicated
///   two-field record, *not* a plain tuple, so that inverse parsing can
///   recognize and split it.
/// - `Seq` is produced by [`concat`](crate::Parser::concat) and the
///   repetition combinators.
/// - `Dyn` holds any other payload, supplied through [`Value::of`].
pub enum Value<T: Token> {
    Unit,
    Token(T),
    Pair(Rc<Pair<T>>),
    Seq(Rc<Vec<Value<T>>>),
    Dyn(DynValue),
}

/// The value of `p.and(q)`: `p`'s value followed by `q`'s value.
pub struct Pair<T: Token> {
    pub first: Value<T>,
    pub second: Value<T>,
}

/// An opaque payload together with the equality test and debug formatter for
/// its erased type. The function pointers are monomorphized at
/// [`Value::of`], which is the only way to construct one.
#[derive(Clone)]
pub struct DynValue {
    value: Rc<dyn Any>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
    fmt: fn(&dyn Any, &mut fmt::Formatter) -> fmt::Result,
}

impl<T: Token> Value<T> {
    /// Wrap an arbitrary payload. Values of distinct types never compare equal.
    pub fn of<V: PartialEq + fmt::Debug + 'static>(value: V) -> Value<T> {
        fn eq<V: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
            match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        fn fmt<V: fmt::Debug + 'static>(v: &dyn Any, f: &mut fmt::Formatter) -> fmt::Result {
            match v.downcast_ref::<V>() {
                Some(v) => write!(f, "{:?}", v),
                None => write!(f, "<dyn>"),
            }
        }
        Value::Dyn(DynValue {
            value: Rc::new(value),
            eq: eq::<V>,
            fmt: fmt::<V>,
        })
    }

    pub fn unit() -> Value<T> {
        Value::Unit
    }

    pub fn token(token: T) -> Value<T> {
        Value::Token(token)
    }

    pub fn pair(first: Value<T>, second: Value<T>) -> Value<T> {
        Value::Pair(Rc::new(Pair { first, second }))
    }

    pub fn seq(items: Vec<Value<T>>) -> Value<T> {
        Value::Seq(Rc::new(items))
    }

    pub fn empty_seq() -> Value<T> {
        Value::Seq(Rc::new(Vec::new()))
    }

    /// The payload, if this is a `Dyn` value of type `V`.
    pub fn downcast_ref<V: 'static>(&self) -> Option<&V> {
        match self {
            Value::Dyn(dyn_value) => dyn_value.value.downcast_ref::<V>(),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&T> {
        match self {
            Value::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(&Value<T>, &Value<T>)> {
        match self {
            Value::Pair(pair) => Some((&pair.first, &pair.second)),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value<T>]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// View this value as a sequence. `Seq` yields its items; any other value
    /// is treated as a one-item sequence, which makes `concat` total on
    /// non-sequence operands.
    pub fn seq_items(&self) -> Vec<Value<T>> {
        match self {
            Value::Seq(items) => items.as_ref().clone(),
            other => vec![other.clone()],
        }
    }

    /// Concatenation of two values viewed as sequences.
    pub fn seq_concat(&self, other: &Value<T>) -> Value<T> {
        let mut items = self.seq_items();
        items.extend(other.seq_items());
        Value::seq(items)
    }
}

impl<T: Token> Clone for Value<T> {
    fn clone(&self) -> Value<T> {
        match self {
            Value::Unit => Value::Unit,
            Value::Token(token) => Value::Token(token.clone()),
            Value::Pair(pair) => Value::Pair(Rc::clone(pair)),
            Value::Seq(items) => Value::Seq(Rc::clone(items)),
            Value::Dyn(dyn_value) => Value::Dyn(dyn_value.clone()),
        }
    }
}

impl<T: Token> PartialEq for Value<T> {
    fn eq(&self, other: &Value<T>) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Token(a), Value::Token(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => {
                a.first == b.first && a.second == b.second
            }
            (Value::Seq(a), Value::Seq(b)) => a.as_ref() == b.as_ref(),
            (Value::Dyn(a), Value::Dyn(b)) => (a.eq)(a.value.as_ref(), b.value.as_ref()),
            _ => false,
        }
    }
}

impl<T: Token> fmt::Debug for Value<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Token(token) => write!(f, "{:?}", token),
            Value::Pair(pair) => write!(f, "({:?}, {:?})", pair.first, pair.second),
            Value::Seq(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Dyn(dyn_value) => (dyn_value.fmt)(dyn_value.value.as_ref(), f),
        }
    }
}

#[test]
fn test_values() {
    use crate::tests_prelude::Tok;

    let unit: Value<Tok> = Value::unit();
    assert_eq!(unit, Value::unit());
    assert_ne!(unit, Value::of(0));

    assert_eq!(Value::<Tok>::of(7), Value::of(7));
    assert_ne!(Value::<Tok>::of(7), Value::of(8));
    assert_ne!(Value::<Tok>::of(7), Value::of("7"));

    let pair = Value::pair(Value::token(Tok::A), Value::of("x"));
    assert_eq!(pair, Value::pair(Value::token(Tok::A), Value::of("x")));
    assert_ne!(pair, Value::pair(Value::token(Tok::B), Value::of("x")));
    assert_eq!(format!("{:?}", pair), "(A, \"x\")");

    let seq = Value::seq(vec![Value::token(Tok::A), Value::token(Tok::B)]);
    assert_eq!(seq.as_seq().unwrap().len(), 2);
    assert_eq!(
        seq.seq_concat(&Value::empty_seq()),
        Value::seq(vec![Value::token(Tok::A), Value::token(Tok::B)])
    );
    assert_eq!(
        Value::token(Tok::A).seq_concat(&seq).seq_items().len(),
        3
    );
}
