//! Quill Core: arena allocation and other low-level primitives shared by the
//! reader, runtime, and compiler crates.
//!
//! Quill evaluates one source text per session. Everything a session
//! allocates that must outlive a single compile/eval call (mostly compiled
//! function templates retained across top-level forms, see `Arena`) is bump
//! allocated here and bulk-freed when the session's `Arena` is dropped.
//! Ordinary heap values (persistent collections, closures, atoms) are `Rc`
//! managed in `quill-runtime` rather than arena-allocated, since threading an
//! arena lifetime through the analyzer/compiler/VM bought little: see
//! DESIGN.md for the tradeoff.

pub mod arena;
pub mod interner;
pub mod location;

pub use arena::Arena;
pub use interner::Interner;
pub use location::SourceLocation;
