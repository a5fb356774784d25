//! Cross-cutting semantic type system.
//!
//! Surface type annotations, operation resolution for the emitter, numeric
//! promotion, and the mapping down to backend IR types all live here so the
//! parser, emitter and backend share one definition.

mod sem_type;

pub use sem_type::{SemType, TypeKind};
