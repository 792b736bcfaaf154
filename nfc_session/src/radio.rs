use crate::error::NfcError;
use crate::filter_set::FilterSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RadioStatus {
    #[serde(rename = "NO_NFC")]
    NoHardware,
    #[serde(rename = "NFC_DISABLED")]
    Disabled,
    #[serde(rename = "NFC_OK")]
    Ready,
}

impl RadioStatus {
    pub fn check(self) -> Result<(), NfcError> {
        match self {
            RadioStatus::NoHardware => Err(NfcError::NoHardware),
            RadioStatus::Disabled => Err(NfcError::HardwareDisabled),
            RadioStatus::Ready => Ok(()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RadioStatus::NoHardware => "NO_NFC",
            RadioStatus::Disabled => "NFC_DISABLED",
            RadioStatus::Ready => "NFC_OK",
        }
    }
}

/// Reader mode flags, passed through to the radio unchanged
pub const READER_NFC_A: u32 = 0x01;
pub const READER_NFC_B: u32 = 0x02;
pub const READER_NFC_F: u32 = 0x04;
pub const READER_NFC_V: u32 = 0x08;
pub const READER_NFC_BARCODE: u32 = 0x10;
pub const READER_SKIP_NDEF_CHECK: u32 = 0x80;
pub const READER_NO_PLATFORM_SOUNDS: u32 = 0x100;

/// Platform side of the radio: availability and foreground dispatch
pub trait Radio: Send + Sync {
    fn status(&self) -> RadioStatus;

    /// Starts routing discoveries matching `filters` to this process
    fn enable_dispatch(&self, filters: &FilterSet);

    fn disable_dispatch(&self);

    /// Hands every tag in range straight to the process, bypassing dispatch
    ///
    /// `flags` is a `READER_*` bitmask selecting polled technologies.
    fn enable_reader_mode(&self, flags: u32);

    fn disable_reader_mode(&self);
}
