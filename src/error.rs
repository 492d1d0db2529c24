//! Error types.
//!
//! Everything here is a broken invariant of the IR handed to the pass (or of
//! its configuration). Shapes the pass merely does not support are skipped
//! silently and never produce an error.

use crate::ir::{BlockId, InstId, Type};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonPtrError {
    #[error("No insertion point after {0}: terminator has no normal-path successor")]
    NoInsertionPoint(InstId),

    #[error("Function '{0}' has no entry block")]
    NoEntryBlock(String),

    #[error("Index of type i{bits} is wider than the {ptr_bits}-bit pointer width")]
    IndexTooWide { bits: u32, ptr_bits: u32 },

    #[error("GEP index has non-integer type {0}")]
    InvalidIndexType(Type),

    #[error("Struct field index must be a constant integer")]
    NonConstantStructIndex,

    #[error("Struct field index {index} out of range for {ty}")]
    FieldOutOfRange { index: i64, ty: Type },

    #[error("Cannot index into type {0}")]
    InvalidIndexedType(Type),

    #[error("Unknown instruction: {0}")]
    UnknownInstruction(InstId),

    #[error("Unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("Unknown argument #{0}")]
    UnknownArgument(usize),

    #[error("Instruction {id} is not {expected}")]
    UnexpectedInstruction { id: InstId, expected: &'static str },

    #[error("Cannot evaluate {0}")]
    NotEvaluable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Verification failed in function '{function}': {message}")]
    Verify { function: String, message: String },
}

pub type CanonPtrResult<T> = Result<T, CanonPtrError>;
