//! `Value::Cons`: the result of `cons`/`conj` on a seq that isn't itself a
//! `PList` (e.g. consing onto a lazy seq or a vector's seq view). Unlike
//! `PList`, a `ConsCell`'s `rest` is an arbitrary seq-producing `Value`
//! (another cons, a lazy seq, a realized list, or `Nil`), not necessarily
//! another `ConsCell`.

use crate::value::Value;
use std::rc::Rc;

pub struct ConsCell {
    pub first: Value,
    pub rest: Value,
}

impl ConsCell {
    pub fn new(first: Value, rest: Value) -> Rc<Self> {
        Rc::new(ConsCell { first, rest })
    }
}
