use nfc_tag::error::{LinkError, NdefError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NfcError {
    #[error("NO_NFC")]
    NoHardware,
    #[error("NFC_DISABLED")]
    HardwareDisabled,
    #[error("tag was lost")]
    TagLost,
    #[error("no tag")]
    NoTag,
    #[error("not connected")]
    NotConnected,
    #[error("already connected to {0}, close it first")]
    AlreadyConnected(String),
    #[error("tag does not support {0}")]
    UnsupportedTechnology(String),
    #[error("{technology} does not support {operation}")]
    UnsupportedOperation {
        technology: String,
        operation: &'static str,
    },
    #[error("tag is read only")]
    ReadOnly,
    #[error("tag capacity is {capacity} bytes, message is {size} bytes")]
    CapacityExceeded { capacity: usize, size: usize },
    #[error("tag is not NDEF")]
    NotNdef,
    #[error("tag is not writable")]
    NotWritable,
    #[error("tag cannot be made read only")]
    CannotMakeReadOnly,
    #[error("tag doesn't support NDEF")]
    UnsupportedFormat,
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] NdefError),
    #[error("invalid record: {0}")]
    InvalidRecord(NdefError),
    #[error("invalid MIME type {0}")]
    InvalidMimeType(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("service stopped")]
    ServiceStopped,
}

impl NfcError {
    /// Stable name of the error kind for the application boundary
    pub fn kind(&self) -> &'static str {
        match self {
            NfcError::NoHardware => "NoHardware",
            NfcError::HardwareDisabled => "HardwareDisabled",
            NfcError::TagLost => "TagLost",
            NfcError::NoTag => "NoTag",
            NfcError::NotConnected => "NotConnected",
            NfcError::AlreadyConnected(_) => "AlreadyConnected",
            NfcError::UnsupportedTechnology(_) => "UnsupportedTechnology",
            NfcError::UnsupportedOperation { .. } => "UnsupportedOperation",
            NfcError::ReadOnly => "ReadOnly",
            NfcError::CapacityExceeded { .. } => "CapacityExceeded",
            NfcError::NotNdef => "NotNdef",
            NfcError::NotWritable => "NotWritable",
            NfcError::CannotMakeReadOnly => "CannotMakeReadOnly",
            NfcError::UnsupportedFormat => "UnsupportedFormat",
            NfcError::MalformedRecord(_) => "MalformedRecord",
            NfcError::InvalidRecord(_) => "InvalidRecord",
            NfcError::InvalidMimeType(_) => "InvalidMimeType",
            NfcError::Io(_) => "Io",
            NfcError::ServiceStopped => "ServiceStopped",
        }
    }
}

impl From<LinkError> for NfcError {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::TagLost => NfcError::TagLost,
            LinkError::Canceled => NfcError::Io(format!("{}", error)),
            LinkError::Io(m) => NfcError::Io(m),
        }
    }
}
