//! Native code backend.
//!
//! Translates verified IR modules to machine code through Cranelift and
//! exposes the compiled entry points as callable addresses:
//!
//! - `cranelift.rs` — IR to Cranelift IR translation
//! - `jit.rs` — JIT module lifecycle and entry-point invocation
//! - `runtime.rs` — environment functions linked into jitted code

pub mod cranelift;
pub mod jit;
pub mod runtime;

pub use jit::JitRuntime;

use thiserror::Error;

use crate::error::{CompileError, ErrorKind};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("unsupported by the native backend: {0}")]
    Unsupported(String),
    #[error("JIT error: {0}")]
    Jit(String),
}

impl From<BackendError> for CompileError {
    fn from(err: BackendError) -> Self {
        CompileError::new(ErrorKind::Backend, err.to_string())
    }
}
