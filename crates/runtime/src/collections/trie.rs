//! A generic CHAMP/HAMT-style persistent trie, keyed by structural `Value`
//! hash (see `hashing::hash_value`) and structural `Value` equality. Shared
//! by `hash_map::HMap` (`V = Value`) and `hash_set::HSet` (`V = ()`).
//!
//! Each level consumes 5 bits of the key's hash to index a sparse,
//! bitmap-compacted array of up to 32 children (`Branch`); `Leaf` holds one
//! entry, `Collision` holds several entries that hash identically (full hash
//! collision, vanishingly rare but necessary for correctness).
//!
//! `remove` is implemented as a full rebuild-by-filter rather than a
//! structural delete: correct but O(n) instead of O(log32 n). Deletes are
//! rare relative to inserts/lookups in this workload, so the simplicity was
//! judged worth it (see DESIGN.md).

use crate::equality::value_eq;
use crate::hashing::hash_value;
use crate::value::Value;
use std::rc::Rc;

const BITS: u32 = 5;
const MASK: u64 = 0x1F;
const MAX_LEVEL: u32 = 13; // ceil(64 / 5)

enum Node<V> {
    Empty,
    Leaf {
        hash: u64,
        key: Value,
        value: V,
    },
    Collision {
        hash: u64,
        entries: Rc<Vec<(Value, V)>>,
    },
    Branch {
        bitmap: u32,
        children: Rc<Vec<Rc<Node<V>>>>,
    },
}

type NodeRef<V> = Rc<Node<V>>;

pub struct Hamt<V: Clone> {
    root: NodeRef<V>,
    count: usize,
}

impl<V: Clone> Hamt<V> {
    pub fn empty() -> Self {
        Hamt {
            root: Rc::new(Node::Empty),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, key: &Value) -> Option<V> {
        get_node(&self.root, hash_value(key), 0, key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&self, key: Value, value: V) -> Hamt<V> {
        let hash = hash_value(&key);
        let (new_root, is_new) = insert_node(&self.root, hash, 0, key, value);
        Hamt {
            root: new_root,
            count: if is_new { self.count + 1 } else { self.count },
        }
    }

    pub fn remove(&self, key: &Value) -> Hamt<V> {
        if !self.contains_key(key) {
            return Hamt {
                root: self.root.clone(),
                count: self.count,
            };
        }
        let remaining: Vec<(Value, V)> = self
            .iter()
            .filter(|(k, _)| !value_eq(k, key))
            .collect();
        let mut result = Hamt::empty();
        for (k, v) in remaining {
            result = result.insert(k, v);
        }
        result
    }

    pub fn iter(&self) -> Vec<(Value, V)> {
        let mut out = Vec::with_capacity(self.count);
        collect_node(&self.root, &mut out);
        out
    }
}

impl<V: Clone> Default for Hamt<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: Clone> Clone for Hamt<V> {
    fn clone(&self) -> Self {
        Hamt {
            root: self.root.clone(),
            count: self.count,
        }
    }
}

fn get_node<V: Clone>(node: &NodeRef<V>, hash: u64, level: u32, key: &Value) -> Option<V> {
    match &**node {
        Node::Empty => None,
        Node::Leaf {
            hash: h,
            key: k,
            value,
        } => {
            if *h == hash && value_eq(k, key) {
                Some(value.clone())
            } else {
                None
            }
        }
        Node::Collision { hash: h, entries } => {
            if *h != hash {
                return None;
            }
            entries
                .iter()
                .find(|(k, _)| value_eq(k, key))
                .map(|(_, v)| v.clone())
        }
        Node::Branch { bitmap, children } => {
            let idx_bit = bit_index(hash, level);
            let bit = 1u32 << idx_bit;
            if bitmap & bit == 0 {
                return None;
            }
            let pos = (bitmap & (bit - 1)).count_ones() as usize;
            get_node(&children[pos], hash, level + 1, key)
        }
    }
}

fn bit_index(hash: u64, level: u32) -> u32 {
    ((hash >> (level * BITS)) & MASK) as u32
}

fn insert_node<V: Clone>(
    node: &NodeRef<V>,
    hash: u64,
    level: u32,
    key: Value,
    value: V,
) -> (NodeRef<V>, bool) {
    match &**node {
        Node::Empty => (Rc::new(Node::Leaf { hash, key, value }), true),
        Node::Leaf {
            hash: h2,
            key: k2,
            value: v2,
        } => {
            if hash == *h2 && value_eq(&key, k2) {
                (Rc::new(Node::Leaf { hash, key, value }), false)
            } else if hash == *h2 {
                (
                    Rc::new(Node::Collision {
                        hash,
                        entries: Rc::new(vec![(k2.clone(), v2.clone()), (key, value)]),
                    }),
                    true,
                )
            } else {
                let branch = split_two(
                    level,
                    *h2,
                    Rc::new(Node::Leaf {
                        hash: *h2,
                        key: k2.clone(),
                        value: v2.clone(),
                    }),
                    hash,
                    key,
                    value,
                );
                (branch, true)
            }
        }
        Node::Collision { hash: h2, entries } => {
            if hash == *h2 {
                if let Some(idx) = entries.iter().position(|(k, _)| value_eq(k, &key)) {
                    let mut new_entries = (**entries).clone();
                    new_entries[idx].1 = value;
                    (
                        Rc::new(Node::Collision {
                            hash,
                            entries: Rc::new(new_entries),
                        }),
                        false,
                    )
                } else {
                    let mut new_entries = (**entries).clone();
                    new_entries.push((key, value));
                    (
                        Rc::new(Node::Collision {
                            hash,
                            entries: Rc::new(new_entries),
                        }),
                        true,
                    )
                }
            } else {
                let branch = split_two(level, *h2, node.clone(), hash, key, value);
                (branch, true)
            }
        }
        Node::Branch { bitmap, children } => {
            if level >= MAX_LEVEL {
                // Hash space exhausted: fall back to a collision bucket
                // keyed by this branch's effective hash prefix.
                let mut entries = Vec::new();
                collect_node(node, &mut entries);
                entries.push((key, value));
                return (
                    Rc::new(Node::Collision {
                        hash,
                        entries: Rc::new(entries),
                    }),
                    true,
                );
            }
            let idx_bit = bit_index(hash, level);
            let bit = 1u32 << idx_bit;
            let pos = (bitmap & (bit - 1)).count_ones() as usize;
            if bitmap & bit != 0 {
                let (new_child, inserted) = insert_node(&children[pos], hash, level + 1, key, value);
                let mut new_children = (**children).clone();
                new_children[pos] = new_child;
                (
                    Rc::new(Node::Branch {
                        bitmap: *bitmap,
                        children: Rc::new(new_children),
                    }),
                    inserted,
                )
            } else {
                let mut new_children = (**children).clone();
                new_children.insert(pos, Rc::new(Node::Leaf { hash, key, value }));
                (
                    Rc::new(Node::Branch {
                        bitmap: bitmap | bit,
                        children: Rc::new(new_children),
                    }),
                    true,
                )
            }
        }
    }
}

/// Builds a `Branch` containing `old_node` (whose effective hash is
/// `old_hash`) alongside a new `key`/`value` leaf at `new_hash`, recursing
/// deeper while their bit-paths coincide.
fn split_two<V: Clone>(
    level: u32,
    old_hash: u64,
    old_node: NodeRef<V>,
    new_hash: u64,
    key: Value,
    value: V,
) -> NodeRef<V> {
    if level >= MAX_LEVEL {
        let mut entries = Vec::new();
        collect_node(&old_node, &mut entries);
        entries.push((key, value));
        return Rc::new(Node::Collision {
            hash: new_hash,
            entries: Rc::new(entries),
        });
    }
    let b_old = bit_index(old_hash, level);
    let b_new = bit_index(new_hash, level);
    if b_old == b_new {
        let child = split_two(level + 1, old_hash, old_node, new_hash, key, value);
        Rc::new(Node::Branch {
            bitmap: 1 << b_old,
            children: Rc::new(vec![child]),
        })
    } else {
        let new_leaf = Rc::new(Node::Leaf {
            hash: new_hash,
            key,
            value,
        });
        let bitmap = (1 << b_old) | (1 << b_new);
        let children = if b_old < b_new {
            vec![old_node, new_leaf]
        } else {
            vec![new_leaf, old_node]
        };
        Rc::new(Node::Branch {
            bitmap,
            children: Rc::new(children),
        })
    }
}

fn collect_node<V: Clone>(node: &Node<V>, out: &mut Vec<(Value, V)>) {
    match node {
        Node::Empty => {}
        Node::Leaf { key, value, .. } => out.push((key.clone(), value.clone())),
        Node::Collision { entries, .. } => out.extend(entries.iter().cloned()),
        Node::Branch { children, .. } => {
            for child in children.iter() {
                collect_node(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_many() {
        let mut map: Hamt<Value> = Hamt::empty();
        for i in 0..200i64 {
            map = map.insert(Value::Int(i), Value::Int(i * 2));
        }
        assert_eq!(map.len(), 200);
        for i in 0..200i64 {
            assert_eq!(map.get(&Value::Int(i)), Some(Value::Int(i * 2)));
        }
        assert_eq!(map.get(&Value::Int(999)), None);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let map: Hamt<Value> = Hamt::empty()
            .insert(Value::Int(1), Value::Int(1))
            .insert(Value::Int(1), Value::Int(2));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::Int(1)), Some(Value::Int(2)));
    }

    #[test]
    fn remove_key() {
        let map: Hamt<Value> = Hamt::empty()
            .insert(Value::Int(1), Value::Int(1))
            .insert(Value::Int(2), Value::Int(2));
        let map2 = map.remove(&Value::Int(1));
        assert_eq!(map2.len(), 1);
        assert_eq!(map2.get(&Value::Int(1)), None);
        assert_eq!(map.len(), 2, "original is untouched");
    }

    #[test]
    fn persistence_across_inserts() {
        let v0: Hamt<Value> = Hamt::empty();
        let v1 = v0.insert(Value::Int(1), Value::Int(1));
        let v2 = v1.insert(Value::Int(2), Value::Int(2));
        assert_eq!(v0.len(), 0);
        assert_eq!(v1.len(), 1);
        assert_eq!(v2.len(), 2);
    }
}
