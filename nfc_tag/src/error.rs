use crate::ndef::Tnf;

use cancellation::OperationCanceled;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NdefError {
    #[error("NDEF message must contain at least one record")]
    EmptyMessage,

    #[error("Too short input: record header truncated")]
    TruncatedHeader,

    #[error("Too short body: expected {}, found {}", expected, found)]
    TooShortBody { expected: usize, found: usize },

    #[error("Invalid TNF value: {0}")]
    InvalidTnf(u8),

    #[error("Payload of {0} bytes exceeds the supported maximum")]
    PayloadTooLarge(usize),

    #[error("First record does not carry the MB flag")]
    MissingMessageBegin,

    #[error("MB flag set on a record that is not the first one")]
    UnexpectedMessageBegin,

    #[error("Unexpected TNF_UNCHANGED outside of a chunk sequence")]
    UnexpectedUnchanged,

    #[error("Chunk sequence interrupted by a non-continuation record")]
    NonContiguousChunk,

    #[error("Continuation chunk must not carry a type or an id")]
    InvalidChunk,

    #[error("Message ended inside a chunk sequence")]
    UnterminatedChunk,

    #[error("{0} trailing bytes after the last record")]
    TrailingData(usize),

    #[error("TNF_EMPTY record must have empty type, id and payload")]
    InvalidEmptyRecord,

    #[error("{field} is {len} bytes long, at most 255 allowed")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("{0:?} record requires a non-empty type")]
    TypeRequired(Tnf),

    #[error("{0:?} record must not have a type")]
    TypeNotAllowed(Tnf),

    #[error("Invalid record JSON: {0}")]
    InvalidJson(String),
}

/// Failure reported by a platform link while talking to a physical tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("tag was lost")]
    TagLost,
    #[error("operation canceled")]
    Canceled,
    #[error("{0}")]
    Io(String),
}

impl From<OperationCanceled> for LinkError {
    fn from(_: OperationCanceled) -> Self {
        LinkError::Canceled
    }
}

impl From<serde_json::Error> for NdefError {
    fn from(error: serde_json::Error) -> Self {
        NdefError::InvalidJson(format!("{}", error))
    }
}
