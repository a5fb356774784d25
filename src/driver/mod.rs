//! Compilation driver.
//!
//! Orchestrates the pipeline — source → parser → emitter → verifier →
//! native backend — and keeps I/O concerns out of the compilation stages.

pub mod pipeline;

pub use pipeline::{compile_source, run_source, CompiledUnit};
