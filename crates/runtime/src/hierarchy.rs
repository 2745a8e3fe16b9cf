//! The global (or user-supplied) hierarchy multimethod dispatch falls back
//! on once an exact dispatch-value match misses: `derive` records a
//! child→parent edge between two keywords/symbols, and `isa?` walks the
//! transitive closure of those edges. One `Hierarchy` is owned by the
//! `Environment` (section 3.3: "shared hierarchy map for multimethod
//! dispatch"); `defmulti` forms may also build their own private hierarchy,
//! which is why this is a value independent of any one `MultiFnValue`.

use crate::equality::value_eq;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
pub struct Hierarchy {
    /// child → direct parents, in `derive` order.
    edges: RefCell<Vec<(Value, Value)>>,
}

impl Hierarchy {
    pub fn new() -> Rc<Self> {
        Rc::new(Hierarchy::default())
    }

    pub fn derive(&self, child: Value, parent: Value) {
        let mut edges = self.edges.borrow_mut();
        if !edges.iter().any(|(c, p)| value_eq(c, &child) && value_eq(p, &parent)) {
            edges.push((child, parent));
        }
    }

    pub fn underive(&self, child: &Value, parent: &Value) {
        self.edges
            .borrow_mut()
            .retain(|(c, p)| !(value_eq(c, child) && value_eq(p, parent)));
    }

    pub fn parents(&self, child: &Value) -> Vec<Value> {
        self.edges
            .borrow()
            .iter()
            .filter(|(c, _)| value_eq(c, child))
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// All ancestors reachable by following `derive` edges transitively,
    /// in breadth-first discovery order with duplicates removed.
    pub fn ancestors(&self, child: &Value) -> Vec<Value> {
        let mut seen: Vec<Value> = Vec::new();
        let mut frontier = self.parents(child);
        while let Some(next) = frontier.pop() {
            if seen.iter().any(|s| value_eq(s, &next)) {
                continue;
            }
            let mut more = self.parents(&next);
            seen.push(next);
            frontier.append(&mut more);
        }
        seen
    }

    /// All registered children of `parent`, direct or transitive.
    pub fn descendants(&self, parent: &Value) -> Vec<Value> {
        self.edges
            .borrow()
            .iter()
            .map(|(c, _)| c.clone())
            .filter(|c| self.isa(c, parent))
            .collect()
    }

    /// `a` is `b`, or `b` is registered (directly or transitively) as an
    /// ancestor of `a` via `derive`.
    pub fn isa(&self, a: &Value, b: &Value) -> bool {
        value_eq(a, b) || self.ancestors(a).iter().any(|anc| value_eq(anc, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::KeywordValue;

    fn kw(name: &str) -> Value {
        Value::Keyword(KeywordValue::unqualified(name))
    }

    #[test]
    fn isa_follows_transitive_derive_chain() {
        let h = Hierarchy::new();
        h.derive(kw("square"), kw("rectangle"));
        h.derive(kw("rectangle"), kw("shape"));
        assert!(h.isa(&kw("square"), &kw("shape")));
        assert!(!h.isa(&kw("shape"), &kw("square")));
        assert!(h.isa(&kw("square"), &kw("square")));
    }

    #[test]
    fn descendants_includes_transitive_children() {
        let h = Hierarchy::new();
        h.derive(kw("square"), kw("rectangle"));
        h.derive(kw("rectangle"), kw("shape"));
        let mut d = h.descendants(&kw("shape"));
        d.sort_by_key(|v| v.to_string());
        assert_eq!(d.len(), 2);
    }
}
