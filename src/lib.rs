//! flintc: a JIT compiler for the Flint scripting language.
//!
//! # Architecture
//! - `source`: byte cursor and spans for diagnostics
//! - `lexer`: tokenization with single-step rollback
//! - `ast`: abstract syntax tree and its printer
//! - `parser`: token stream → syntax tree
//! - `types`: semantic type system shared across phases
//! - `ir`: SSA intermediate representation, builder, verifier, and the
//!   AST→IR emitter
//! - `backend`: Cranelift-based native code generation and JIT execution
//! - `driver`: compilation orchestration

pub mod ast;
pub mod backend;
pub mod driver;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod types;
