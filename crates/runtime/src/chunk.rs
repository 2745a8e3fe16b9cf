//! Chunked sequences: `ArrayChunk` is a fixed, already-realized slice of up
//! to 32 elements; `ChunkedCons` pairs a chunk with the (possibly lazy) seq
//! that continues after it; `ChunkBuffer` is the mutable accumulator a lazy
//! producer fills before freezing it into an `ArrayChunk`. Together these
//! let `map`/`filter`/`reduce` over a chunked source process 32 elements at
//! a time instead of realizing one cons cell per element.

use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub struct ArrayChunkCell {
    items: Rc<Vec<Value>>,
    offset: usize,
    end: usize,
}

impl ArrayChunkCell {
    pub fn new(items: Vec<Value>) -> Rc<Self> {
        let end = items.len();
        Rc::new(ArrayChunkCell {
            items: Rc::new(items),
            offset: 0,
            end,
        })
    }

    pub fn count(&self) -> usize {
        self.end - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.end
    }

    pub fn nth(&self, idx: usize) -> Option<Value> {
        self.items.get(self.offset + idx).cloned()
    }

    /// A chunk view skipping the first `n` elements, sharing the backing
    /// array (no copy).
    pub fn drop_first(self: &Rc<Self>, n: usize) -> Rc<ArrayChunkCell> {
        Rc::new(ArrayChunkCell {
            items: self.items.clone(),
            offset: (self.offset + n).min(self.end),
            end: self.end,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.items[self.offset..self.end].iter().cloned()
    }
}

pub struct ChunkedConsCell {
    pub chunk: Rc<ArrayChunkCell>,
    pub rest: Value,
}

impl ChunkedConsCell {
    pub fn new(chunk: Rc<ArrayChunkCell>, rest: Value) -> Rc<Self> {
        Rc::new(ChunkedConsCell { chunk, rest })
    }
}

/// A fixed-capacity (default 32) mutable staging buffer used while a
/// producer is filling a chunk; `chunk()` freezes the contents into an
/// immutable `ArrayChunkCell` and clears the buffer for reuse.
pub struct ChunkBufferCell {
    buffer: RefCell<Vec<Value>>,
    capacity: usize,
}

pub const DEFAULT_CHUNK_SIZE: usize = 32;

impl ChunkBufferCell {
    pub fn new(capacity: usize) -> Rc<Self> {
        Rc::new(ChunkBufferCell {
            buffer: RefCell::new(Vec::with_capacity(capacity)),
            capacity,
        })
    }

    pub fn count(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    pub fn add(&self, value: Value) {
        self.buffer.borrow_mut().push(value);
    }

    pub fn chunk(&self) -> Rc<ArrayChunkCell> {
        let items = self.buffer.borrow_mut().drain(..).collect();
        ArrayChunkCell::new(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_fills_and_freezes() {
        let buf = ChunkBufferCell::new(4);
        buf.add(Value::Int(1));
        buf.add(Value::Int(2));
        assert_eq!(buf.count(), 2);
        let chunk = buf.chunk();
        assert_eq!(chunk.count(), 2);
        assert_eq!(buf.count(), 0);
    }

    #[test]
    fn drop_first_shares_backing_storage() {
        let chunk = ArrayChunkCell::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let dropped = chunk.drop_first(1);
        assert_eq!(dropped.count(), 2);
        assert_eq!(dropped.nth(0), Some(Value::Int(2)));
    }
}
