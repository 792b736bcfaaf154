use crate::error::LinkError;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cancellation::CancellationToken;

pub const NDEF: &str = "Ndef";
pub const NDEF_FORMATABLE: &str = "NdefFormatable";
pub const NFC_A: &str = "NfcA";
pub const NFC_B: &str = "NfcB";
pub const NFC_F: &str = "NfcF";
pub const NFC_V: &str = "NfcV";
pub const ISO_DEP: &str = "IsoDep";
pub const MIFARE_CLASSIC: &str = "MifareClassic";
pub const MIFARE_ULTRALIGHT: &str = "MifareUltralight";

/// Optional abilities of a low-level technology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TechCapabilities {
    pub transceive: bool,
    pub configurable_timeout: bool,
    pub max_transceive_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefStatus {
    pub ndef_type: String,
    pub writable: bool,
    pub can_make_read_only: bool,
}

/// Link to one physical tag, implemented by the platform radio
///
/// Every call blocks for at most the hardware timeout and reports
/// `LinkError::TagLost` once the tag has left the field.
pub trait TagLink: Send + Sync {
    fn is_present(&self) -> bool;

    fn connect(&self, technology: &str) -> Result<(), LinkError>;

    fn close(&self, technology: &str) -> Result<(), LinkError>;

    fn capabilities(&self, technology: &str) -> TechCapabilities;

    fn set_timeout(&self, technology: &str, timeout: Duration) -> Result<(), LinkError>;

    fn transceive(&self, technology: &str, data: &[u8]) -> Result<Vec<u8>, LinkError>;

    fn ndef_status(&self) -> Result<NdefStatus, LinkError>;

    /// Returns stored NDEF message bytes, `None` for a blank tag
    fn read_ndef(&self, ct: &CancellationToken) -> Result<Option<Vec<u8>>, LinkError>;

    fn write_ndef(&self, raw: &[u8]) -> Result<(), LinkError>;

    fn make_read_only(&self) -> Result<bool, LinkError>;

    fn format_ndef(&self, raw: &[u8]) -> Result<(), LinkError>;
}

/// Handle to a discovered tag
#[derive(Clone)]
pub struct Tag {
    id: Vec<u8>,
    tech_list: Vec<String>,
    max_size: Option<usize>,
    link: Arc<dyn TagLink>,
}

impl Tag {
    pub fn new(
        id: Vec<u8>,
        tech_list: Vec<String>,
        max_size: Option<usize>,
        link: Arc<dyn TagLink>,
    ) -> Self {
        Self {
            id,
            tech_list,
            max_size,
            link,
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn tech_list(&self) -> &[String] {
        &self.tech_list
    }

    pub fn has_technology(&self, technology: &str) -> bool {
        self.tech_list.iter().any(|x| x == technology)
    }

    /// Maximum NDEF message size the tag can store
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn link(&self) -> &dyn TagLink {
        self.link.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.link.is_present()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("id", &format_args!("{:02X?}", self.id))
            .field("tech_list", &self.tech_list)
            .field("max_size", &self.max_size)
            .finish()
    }
}
