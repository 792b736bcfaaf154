use crate::error::NfcError;

use std::time::Duration;

use cancellation::CancellationToken;
use enum_dispatch::enum_dispatch;

use nfc_tag::ndef::{decode, NdefMessage};
use nfc_tag::tag::{NdefStatus, Tag, TechCapabilities, NDEF, NDEF_FORMATABLE};

#[enum_dispatch]
pub trait TagTechnology {
    fn technology(&self) -> &str;

    fn connect(&mut self) -> Result<(), NfcError>;

    fn close(&mut self) -> Result<(), NfcError>;

    fn is_connected(&self) -> bool;

    fn capabilities(&self) -> TechCapabilities;

    fn transceive(&mut self, data: &[u8]) -> Result<Vec<u8>, NfcError>;

    /// Applies hardware timeout, returns false if the technology has none
    fn set_timeout(&mut self, timeout: Duration) -> Result<bool, NfcError>;
}

/// Low-level technology opened on a tag
#[enum_dispatch(TagTechnology)]
pub enum TechnologySession {
    Ndef(NdefTech),
    NdefFormatable(NdefFormatableTech),
    Generic(GenericTech),
}

impl TechnologySession {
    /// Picks the variant for an advertised technology, not connected yet
    pub fn new(technology: &str, tag: &Tag) -> Self {
        match technology {
            NDEF => NdefTech::new(tag.clone()).into(),
            NDEF_FORMATABLE => NdefFormatableTech::new(tag.clone()).into(),
            _ => GenericTech::new(technology, tag.clone()).into(),
        }
    }
}

struct Connection {
    tag: Tag,
    technology: String,
    connected: bool,
}

impl Connection {
    fn new(technology: &str, tag: Tag) -> Self {
        Self {
            tag,
            technology: technology.to_owned(),
            connected: false,
        }
    }

    fn connect(&mut self) -> Result<(), NfcError> {
        if !self.tag.is_present() {
            return Err(NfcError::TagLost);
        }
        self.tag.link().connect(&self.technology)?;
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), NfcError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        Ok(self.tag.link().close(&self.technology)?)
    }

    fn ensure_connected(&self) -> Result<(), NfcError> {
        if self.connected {
            Ok(())
        } else {
            Err(NfcError::NotConnected)
        }
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T, NfcError> {
        Err(NfcError::UnsupportedOperation {
            technology: self.technology.clone(),
            operation,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error on closing {} connection: {}", self.technology, e);
        }
    }
}

pub struct NdefTech {
    connection: Connection,
}

impl NdefTech {
    pub fn new(tag: Tag) -> Self {
        Self {
            connection: Connection::new(NDEF, tag),
        }
    }

    pub fn status(&self) -> Result<NdefStatus, NfcError> {
        self.connection.ensure_connected()?;
        Ok(self.connection.tag.link().ndef_status()?)
    }

    /// Reads stored message, `None` if the tag holds nothing
    pub fn read_message(&self, ct: &CancellationToken) -> Result<Option<NdefMessage>, NfcError> {
        self.connection.ensure_connected()?;
        match self.connection.tag.link().read_ndef(ct)? {
            Some(raw) if !raw.is_empty() => Ok(Some(decode(&raw)?)),
            _ => Ok(None),
        }
    }

    pub fn write_message(&self, message: &NdefMessage) -> Result<(), NfcError> {
        self.connection.ensure_connected()?;
        Ok(self.connection.tag.link().write_ndef(&message.to_vec())?)
    }

    pub fn make_read_only(&self) -> Result<bool, NfcError> {
        self.connection.ensure_connected()?;
        Ok(self.connection.tag.link().make_read_only()?)
    }
}

impl TagTechnology for NdefTech {
    fn technology(&self) -> &str {
        &self.connection.technology
    }

    fn connect(&mut self) -> Result<(), NfcError> {
        self.connection.connect()
    }

    fn close(&mut self) -> Result<(), NfcError> {
        self.connection.close()
    }

    fn is_connected(&self) -> bool {
        self.connection.connected
    }

    fn capabilities(&self) -> TechCapabilities {
        TechCapabilities::default()
    }

    fn transceive(&mut self, _: &[u8]) -> Result<Vec<u8>, NfcError> {
        self.connection.unsupported("transceive")
    }

    fn set_timeout(&mut self, _: Duration) -> Result<bool, NfcError> {
        Ok(false)
    }
}

pub struct NdefFormatableTech {
    connection: Connection,
}

impl NdefFormatableTech {
    pub fn new(tag: Tag) -> Self {
        Self {
            connection: Connection::new(NDEF_FORMATABLE, tag),
        }
    }

    /// Formats the tag for NDEF and writes the first message
    pub fn format(&self, message: &NdefMessage) -> Result<(), NfcError> {
        self.connection.ensure_connected()?;
        Ok(self.connection.tag.link().format_ndef(&message.to_vec())?)
    }
}

impl TagTechnology for NdefFormatableTech {
    fn technology(&self) -> &str {
        &self.connection.technology
    }

    fn connect(&mut self) -> Result<(), NfcError> {
        self.connection.connect()
    }

    fn close(&mut self) -> Result<(), NfcError> {
        self.connection.close()
    }

    fn is_connected(&self) -> bool {
        self.connection.connected
    }

    fn capabilities(&self) -> TechCapabilities {
        TechCapabilities::default()
    }

    fn transceive(&mut self, _: &[u8]) -> Result<Vec<u8>, NfcError> {
        self.connection.unsupported("transceive")
    }

    fn set_timeout(&mut self, _: Duration) -> Result<bool, NfcError> {
        Ok(false)
    }
}

/// Any raw technology (NfcA, IsoDep, MifareClassic, ...)
pub struct GenericTech {
    connection: Connection,
    capabilities: TechCapabilities,
}

impl GenericTech {
    pub fn new(technology: &str, tag: Tag) -> Self {
        let capabilities = tag.link().capabilities(technology);
        Self {
            connection: Connection::new(technology, tag),
            capabilities,
        }
    }
}

impl TagTechnology for GenericTech {
    fn technology(&self) -> &str {
        &self.connection.technology
    }

    fn connect(&mut self) -> Result<(), NfcError> {
        self.connection.connect()
    }

    fn close(&mut self) -> Result<(), NfcError> {
        self.connection.close()
    }

    fn is_connected(&self) -> bool {
        self.connection.connected
    }

    fn capabilities(&self) -> TechCapabilities {
        self.capabilities
    }

    fn transceive(&mut self, data: &[u8]) -> Result<Vec<u8>, NfcError> {
        if !self.capabilities.transceive {
            return self.connection.unsupported("transceive");
        }
        self.connection.ensure_connected()?;
        Ok(self
            .connection
            .tag
            .link()
            .transceive(&self.connection.technology, data)?)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<bool, NfcError> {
        if !self.capabilities.configurable_timeout {
            return Ok(false);
        }
        self.connection.ensure_connected()?;
        self.connection
            .tag
            .link()
            .set_timeout(&self.connection.technology, timeout)?;
        Ok(true)
    }
}
