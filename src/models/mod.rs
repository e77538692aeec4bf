pub mod enums;
pub mod medicine;
pub mod owner;

pub use enums::*;
pub use medicine::*;
pub use owner::*;

use thiserror::Error;

/// Rejected input at the boundary. Nothing is persisted when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid time (expected HH:MM): {0}")]
    InvalidTime(String),

    #[error("Instructions exceed {max} characters")]
    InstructionsTooLong { max: usize },

    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid owner identity: {0:?}")]
    InvalidOwner(String),

    #[error("No fields to update")]
    EmptyUpdate,
}
