//! Quill Compiler: the analyzer, bytecode compiler, VM, tree-walk
//! evaluator, cross-backend bridge, and the bundled core-library source
//! that bootstraps a fresh session (section 4.9).
//!
//! `quill-compiler` is the one crate that depends on both `quill-reader`
//! (to turn `eval_string`'s `&str` into `Form`s) and `quill-runtime` (for
//! `Value`/`Environment`); nothing downstream of it depends back in.

pub mod analyzer;
pub mod bridge;
pub mod bytecode;
pub mod compile;
pub mod core_lib;
pub mod eval;
pub mod node;
pub mod tree_walk;
pub mod vm;

pub use bridge::{new_session, QuillDispatcher};
pub use eval::{eval_compare, eval_string, eval_string_vm, CompareResult};
