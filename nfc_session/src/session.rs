use crate::error::NfcError;
use crate::technology::{NdefFormatableTech, NdefTech, TagTechnology, TechnologySession};

use std::time::Duration;

use cancellation::{CancellationToken, CancellationTokenSource};
use serde::Serialize;

use nfc_tag::ndef::NdefMessage;
use nfc_tag::tag::{Tag, NDEF, NDEF_FORMATABLE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_transceive_length: Option<usize>,
}

/// The single application-facing technology session
///
/// Either idle or connected to exactly one technology. Whoever owns the
/// value owns the session, a second `connect` must be preceded by `close`.
#[derive(Default)]
pub struct TagSession {
    active: Option<TechnologySession>,
    timeout: Option<Duration>,
}

impl TagSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn technology(&self) -> Option<&str> {
        self.active.as_ref().map(|x| x.technology())
    }

    /// Hardware timeout applied on connect, if the technology took one
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn connect(
        &mut self,
        technology: &str,
        tag: &Tag,
        timeout: Option<Duration>,
    ) -> Result<ConnectInfo, NfcError> {
        self.ensure_idle()?;

        if !tag.has_technology(technology) {
            return Err(NfcError::UnsupportedTechnology(technology.to_owned()));
        }

        let mut session = TechnologySession::new(technology, tag);
        session.connect()?;

        self.timeout = None;
        if let Some(timeout) = timeout {
            match session.set_timeout(timeout) {
                Ok(true) => self.timeout = Some(timeout),
                Ok(false) => log::debug!("{} has no configurable timeout", technology),
                Err(NfcError::TagLost) => {
                    close_quietly(session);
                    return Err(NfcError::TagLost);
                }
                Err(e) => log::warn!("error on setting {} timeout: {}", technology, e),
            }
        }

        let info = ConnectInfo {
            max_transceive_length: session.capabilities().max_transceive_length,
        };

        log::debug!("session connected to {}", technology);
        self.active = Some(session);

        Ok(info)
    }

    pub fn transceive(&mut self, data: &[u8]) -> Result<Vec<u8>, NfcError> {
        match self.active.as_mut() {
            Some(session) => session.transceive(data),
            None => Err(NfcError::NotConnected),
        }
    }

    /// Returns to idle even if the disconnect itself fails
    pub fn close(&mut self) -> Result<(), NfcError> {
        self.timeout = None;
        match self.active.take() {
            Some(mut session) => {
                log::debug!("session closed: {}", session.technology());
                session.close()
            }
            None => Ok(()),
        }
    }

    /// Writes message in place, formatting the tag first if it is blank
    pub fn write(&mut self, message: &NdefMessage, tag: &Tag) -> Result<(), NfcError> {
        self.ensure_idle()?;
        ensure_present(tag)?;

        if tag.has_technology(NDEF) {
            let mut ndef = NdefTech::new(tag.clone());
            ndef.connect()?;
            let result = write_in_place(&ndef, message, tag.max_size());
            close_quietly(ndef);
            result
        } else if tag.has_technology(NDEF_FORMATABLE) {
            let mut formatable = NdefFormatableTech::new(tag.clone());
            formatable.connect()?;
            let result = formatable.format(message);
            close_quietly(formatable);
            result
        } else {
            Err(NfcError::UnsupportedFormat)
        }
    }

    /// Wipes the tag by writing a single empty record
    pub fn erase(&mut self, tag: &Tag) -> Result<(), NfcError> {
        self.write(&NdefMessage::empty(), tag)
    }

    pub fn make_read_only(&mut self, tag: &Tag) -> Result<(), NfcError> {
        self.ensure_idle()?;
        ensure_present(tag)?;

        if !tag.has_technology(NDEF) {
            return Err(NfcError::NotNdef);
        }

        let mut ndef = NdefTech::new(tag.clone());
        ndef.connect()?;
        let result = lock(&ndef);
        close_quietly(ndef);
        result
    }

    /// Reads message stored on the tag
    pub fn read(&mut self, tag: &Tag) -> Result<Option<NdefMessage>, NfcError> {
        self.ensure_idle()?;
        ensure_present(tag)?;

        if !tag.has_technology(NDEF) {
            return Err(NfcError::NotNdef);
        }

        read_transient(tag, &CancellationTokenSource::new())
    }

    fn ensure_idle(&self) -> Result<(), NfcError> {
        match &self.active {
            Some(session) => Err(NfcError::AlreadyConnected(session.technology().to_owned())),
            None => Ok(()),
        }
    }
}

/// Short-lived connect, read, close cycle independent of any `TagSession`
pub fn read_transient(tag: &Tag, ct: &CancellationToken) -> Result<Option<NdefMessage>, NfcError> {
    let mut ndef = NdefTech::new(tag.clone());
    ndef.connect()?;
    let result = ndef.read_message(ct);
    close_quietly(ndef);
    result
}

fn ensure_present(tag: &Tag) -> Result<(), NfcError> {
    if tag.is_present() {
        Ok(())
    } else {
        Err(NfcError::TagLost)
    }
}

fn write_in_place(
    ndef: &NdefTech,
    message: &NdefMessage,
    max_size: Option<usize>,
) -> Result<(), NfcError> {
    if !ndef.status()?.writable {
        return Err(NfcError::ReadOnly);
    }

    let size = message.len();
    if let Some(capacity) = max_size {
        if size > capacity {
            return Err(NfcError::CapacityExceeded { capacity, size });
        }
    }

    ndef.write_message(message)
}

fn lock(ndef: &NdefTech) -> Result<(), NfcError> {
    let status = ndef.status()?;
    if !status.writable {
        return Err(NfcError::NotWritable);
    }
    if !status.can_make_read_only {
        return Err(NfcError::CannotMakeReadOnly);
    }
    if ndef.make_read_only()? {
        Ok(())
    } else {
        Err(NfcError::CannotMakeReadOnly)
    }
}

fn close_quietly(mut technology: impl TagTechnology) {
    if let Err(e) = technology.close() {
        log::warn!("error on closing {}: {}", technology.technology(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedTag;

    use std::sync::Arc;

    use nfc_tag::ndef::{NdefRecord, Tnf};
    use nfc_tag::tag::{TechCapabilities, ISO_DEP, NFC_A};

    fn iso_dep_tag() -> (Arc<SimulatedTag>, Tag) {
        let sim = Arc::new(
            SimulatedTag::ndef(vec![0x04, 0x01], None, Some(128)).with_technology(
                ISO_DEP,
                TechCapabilities {
                    transceive: true,
                    configurable_timeout: true,
                    max_transceive_length: Some(261),
                },
            ),
        );
        let tag = sim.tag();
        (sim, tag)
    }

    #[test]
    fn connect_twice_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        let info = session
            .connect(ISO_DEP, &tag, Some(Duration::from_millis(500)))
            .unwrap();
        assert_eq!(info.max_transceive_length, Some(261));
        assert_eq!(sim.timeout(ISO_DEP), Some(Duration::from_millis(500)));

        assert_eq!(
            session.connect(NDEF, &tag, None),
            Err(NfcError::AlreadyConnected(ISO_DEP.to_owned()))
        );

        // first session still usable
        assert_eq!(session.transceive(&[0x90, 0x00]).unwrap(), vec![0x90, 0x00]);
        assert_eq!(session.technology(), Some(ISO_DEP));
    }

    #[test]
    fn connect_errors_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        assert_eq!(
            session.connect(NFC_A, &tag, None),
            Err(NfcError::UnsupportedTechnology(NFC_A.to_owned()))
        );

        sim.remove();
        assert_eq!(session.connect(ISO_DEP, &tag, None), Err(NfcError::TagLost));
        assert!(!session.is_connected());
    }

    #[test]
    fn lost_on_timeout_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        sim.remove_on_set_timeout();
        assert_eq!(
            session.connect(ISO_DEP, &tag, Some(Duration::from_millis(100))),
            Err(NfcError::TagLost)
        );
        assert!(!session.is_connected());
        assert!(!sim.is_connected(ISO_DEP));
    }

    #[test]
    fn timeout_ignored_test() {
        let (_sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        let info = session
            .connect(NDEF, &tag, Some(Duration::from_millis(100)))
            .unwrap();

        assert_eq!(info, ConnectInfo::default());
        assert_eq!(session.timeout(), None);
    }

    #[test]
    fn transceive_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        assert_eq!(session.transceive(&[0x00]), Err(NfcError::NotConnected));

        session.connect(NDEF, &tag, None).unwrap();
        assert!(matches!(
            session.transceive(&[0x00]),
            Err(NfcError::UnsupportedOperation { .. })
        ));
        session.close().unwrap();

        session.connect(ISO_DEP, &tag, None).unwrap();
        sim.remove();
        assert_eq!(session.transceive(&[0x00]), Err(NfcError::TagLost));
    }

    #[test]
    fn close_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        assert_eq!(session.close(), Ok(()));

        session.connect(ISO_DEP, &tag, None).unwrap();
        sim.fail_close();
        assert!(session.close().is_err());
        assert!(!session.is_connected());

        assert!(session.connect(ISO_DEP, &tag, None).is_ok());
    }

    #[test]
    fn write_test() {
        let (sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();
        let message = NdefMessage::single(NdefRecord::text("en", "hello").unwrap());

        session.write(&message, &tag).unwrap();
        assert_eq!(sim.stored_message(), Some(message.to_vec()));
        assert_eq!(session.read(&tag).unwrap(), Some(message));
        assert!(!sim.is_connected(NDEF));
    }

    #[test]
    fn capacity_test() {
        let sim = Arc::new(SimulatedTag::ndef(vec![1], None, Some(48)));
        let tag = sim.tag();
        let mut session = TagSession::new();

        // 3 header bytes + 10 type bytes + 37 payload bytes
        let record = NdefRecord::mime("text/plain", vec![0x41; 37]).unwrap();
        let message = NdefMessage::single(record);
        assert_eq!(message.len(), 50);

        assert_eq!(
            session.write(&message, &tag),
            Err(NfcError::CapacityExceeded {
                capacity: 48,
                size: 50
            })
        );
        assert_eq!(sim.ndef_writes(), 0);
    }

    #[test]
    fn write_errors_test() {
        let sim = Arc::new(SimulatedTag::ndef(vec![1], None, None).read_only());
        let tag = sim.tag();
        let mut session = TagSession::new();

        assert_eq!(
            session.write(&NdefMessage::empty(), &tag),
            Err(NfcError::ReadOnly)
        );

        let sim = Arc::new(SimulatedTag::plain(vec![2]));
        assert_eq!(
            session.write(&NdefMessage::empty(), &sim.tag()),
            Err(NfcError::UnsupportedFormat)
        );

        let sim = Arc::new(SimulatedTag::ndef(vec![3], None, None));
        let tag = sim.tag();
        sim.remove();
        assert_eq!(session.write(&NdefMessage::empty(), &tag), Err(NfcError::TagLost));
    }

    #[test]
    fn format_test() {
        let sim = Arc::new(SimulatedTag::formatable(vec![1]));
        let tag = sim.tag();
        let mut session = TagSession::new();
        let message = NdefMessage::single(NdefRecord::uri("https://example.com").unwrap());

        session.write(&message, &tag).unwrap();

        assert_eq!(sim.stored_message(), Some(message.to_vec()));
        assert_eq!(sim.ndef_writes(), 0);
    }

    #[test]
    fn erase_test() {
        let stored = NdefMessage::single(NdefRecord::text("en", "data").unwrap());
        let sim = Arc::new(SimulatedTag::ndef(vec![1], Some(stored), Some(64)));
        let tag = sim.tag();
        let mut session = TagSession::new();

        session.erase(&tag).unwrap();

        let message = session.read(&tag).unwrap().unwrap();
        assert_eq!(message.records().len(), 1);
        let record = &message.records()[0];
        assert_eq!(record.tnf(), Tnf::Empty);
        assert!(record.record_type().is_empty());
        assert!(record.id().is_empty());
        assert!(record.payload().is_empty());
    }

    #[test]
    fn make_read_only_test() {
        let mut session = TagSession::new();

        let sim = Arc::new(SimulatedTag::ndef(vec![1], None, None));
        session.make_read_only(&sim.tag()).unwrap();
        assert_eq!(
            session.make_read_only(&sim.tag()),
            Err(NfcError::NotWritable)
        );

        let sim = Arc::new(SimulatedTag::ndef(vec![2], None, None).locked());
        assert_eq!(
            session.make_read_only(&sim.tag()),
            Err(NfcError::CannotMakeReadOnly)
        );

        let sim = Arc::new(SimulatedTag::formatable(vec![3]));
        assert_eq!(session.make_read_only(&sim.tag()), Err(NfcError::NotNdef));
    }

    #[test]
    fn io_while_connected_test() {
        let (_sim, tag) = iso_dep_tag();
        let mut session = TagSession::new();

        session.connect(ISO_DEP, &tag, None).unwrap();

        assert!(matches!(
            session.write(&NdefMessage::empty(), &tag),
            Err(NfcError::AlreadyConnected(_))
        ));
        assert!(matches!(
            session.make_read_only(&tag),
            Err(NfcError::AlreadyConnected(_))
        ));
    }
}
