use crate::error::NfcError;
use crate::technology::{NdefTech, TagTechnology};

use std::time::Duration;

use cancellation::CancellationTokenSource;
use serde::Serialize;

use nfc_tag::ndef::{decode, NdefMessage};
use nfc_tag::tag::{NdefStatus, Tag, NDEF, NDEF_FORMATABLE};

pub const PUSH_PROTOCOL_TYPE: &str = "NDEF Push Protocol";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryAction {
    TagDiscovered,
    TechDiscovered,
    NdefDiscovered,
}

/// What the platform hands over when a tag enters the field
#[derive(Debug, Clone)]
pub struct Discovery {
    pub action: Option<DiscoveryAction>,
    pub tag: Tag,
    /// Raw messages delivered inline with the discovery (push protocol)
    pub messages: Vec<Vec<u8>>,
    /// Discovery replayed when the host was relaunched from history
    pub from_history: bool,
}

impl Discovery {
    pub fn new(action: DiscoveryAction, tag: Tag) -> Self {
        Self {
            action: Some(action),
            tag,
            messages: vec![],
            from_history: false,
        }
    }

    pub fn without_action(tag: Tag) -> Self {
        Self {
            action: None,
            tag,
            messages: vec![],
            from_history: false,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Vec<u8>>) -> Self {
        self.messages = messages;
        self
    }

    pub fn replayed(mut self) -> Self {
        self.from_history = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub id: Vec<u8>,
    pub tech_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ndef_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_writable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_make_read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndef_message: Option<NdefMessage>,
}

impl TagInfo {
    /// Identity and technologies only
    pub fn from_tag(tag: &Tag) -> Self {
        Self {
            id: tag.id().to_vec(),
            tech_types: tag.tech_list().to_vec(),
            max_size: None,
            ndef_type: None,
            is_writable: None,
            can_make_read_only: None,
            ndef_message: None,
        }
    }

    fn with_status(mut self, tag: &Tag, status: Option<NdefStatus>) -> Self {
        self.max_size = tag.max_size();
        if let Some(status) = status {
            self.ndef_type = Some(status.ndef_type);
            self.is_writable = Some(status.writable);
            self.can_make_read_only = Some(status.can_make_read_only);
        }
        self
    }

    fn with_message(mut self, message: Option<NdefMessage>) -> Self {
        self.ndef_message = message;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "tag", rename_all = "kebab-case")]
pub enum TagEvent {
    Tag(TagInfo),
    Ndef(TagInfo),
    NdefMime(TagInfo),
    NdefFormatable(TagInfo),
}

impl TagEvent {
    pub fn info(&self) -> &TagInfo {
        match self {
            TagEvent::Tag(info)
            | TagEvent::Ndef(info)
            | TagEvent::NdefMime(info)
            | TagEvent::NdefFormatable(info) => info,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Turns discoveries into events, enriching NDEF tags with a transient read
#[derive(Debug, Clone)]
pub struct TagClassifier {
    read_timeout: Duration,
}

impl TagClassifier {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    pub fn classify(&self, discovery: &Discovery) -> Vec<TagEvent> {
        let action = match discovery.action {
            Some(action) => action,
            None => return vec![],
        };

        if discovery.from_history {
            log::info!("discovery replayed from history, ignored");
            return vec![];
        }

        log::debug!("classify {:?} for {:?}", action, discovery.tag);

        let tag = &discovery.tag;
        match action {
            DiscoveryAction::TagDiscovered => vec![TagEvent::Tag(TagInfo::from_tag(tag))],
            DiscoveryAction::TechDiscovered => tag
                .tech_list()
                .iter()
                .filter_map(|x| match x.as_str() {
                    NDEF_FORMATABLE => Some(TagEvent::NdefFormatable(TagInfo::from_tag(tag))),
                    NDEF => Some(TagEvent::Ndef(self.ndef_info(tag))),
                    _ => None,
                })
                .collect(),
            DiscoveryAction::NdefDiscovered => {
                let mut info = if tag.has_technology(NDEF) {
                    self.ndef_info(tag)
                } else {
                    TagInfo::from_tag(tag)
                };
                if info.ndef_message.is_none() {
                    if let Some(message) = inline_message(&discovery.messages) {
                        info.ndef_message = Some(message);
                        info.ndef_type = Some(PUSH_PROTOCOL_TYPE.to_owned());
                    }
                }
                vec![TagEvent::NdefMime(info)]
            }
        }
    }

    /// Event for a tag handed over directly in reader mode
    pub fn classify_reader(&self, tag: &Tag) -> TagEvent {
        if tag.has_technology(NDEF) {
            TagEvent::Ndef(self.ndef_info(tag))
        } else {
            TagEvent::Tag(TagInfo::from_tag(tag))
        }
    }

    fn ndef_info(&self, tag: &Tag) -> TagInfo {
        match self.read(tag) {
            Ok((status, message)) => TagInfo::from_tag(tag)
                .with_status(tag, Some(status))
                .with_message(message),
            Err(e) => {
                log::warn!("transient read of {:?} failed: {}", tag, e);
                TagInfo::from_tag(tag).with_status(tag, None)
            }
        }
    }

    fn read(&self, tag: &Tag) -> Result<(NdefStatus, Option<NdefMessage>), NfcError> {
        let cts = CancellationTokenSource::new();
        cts.cancel_after(self.read_timeout);

        let mut ndef = NdefTech::new(tag.clone());
        ndef.connect()?;
        let result = ndef
            .status()
            .and_then(|status| Ok((status, ndef.read_message(&cts)?)));
        if let Err(e) = ndef.close() {
            log::warn!("error on closing transient read: {}", e);
        }
        result
    }
}

fn inline_message(messages: &[Vec<u8>]) -> Option<NdefMessage> {
    if messages.len() > 1 {
        log::error!("expected one inline NDEF message but found {}", messages.len());
    }
    let raw = messages.first()?;
    match decode(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            log::warn!("inline NDEF message dropped: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedTag;

    use std::sync::Arc;

    use nfc_tag::ndef::NdefRecord;
    use nfc_tag::tag::{TechCapabilities, NFC_A};

    fn classifier() -> TagClassifier {
        TagClassifier::new(Duration::from_millis(100))
    }

    fn message(text: &str) -> NdefMessage {
        NdefMessage::single(NdefRecord::text("en", text).unwrap())
    }

    #[test]
    fn no_action_test() {
        let sim = Arc::new(SimulatedTag::plain(vec![1]));
        assert!(classifier().classify(&Discovery::without_action(sim.tag())).is_empty());

        let replayed = Discovery::new(DiscoveryAction::TagDiscovered, sim.tag()).replayed();
        assert!(classifier().classify(&replayed).is_empty());
    }

    #[test]
    fn tag_discovered_test() {
        let sim = Arc::new(
            SimulatedTag::plain(vec![0xDE, 0xAD]).with_technology(NFC_A, TechCapabilities::default()),
        );
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TagDiscovered, sim.tag()));

        assert_eq!(
            events,
            vec![TagEvent::Tag(TagInfo {
                id: vec![0xDE, 0xAD],
                tech_types: vec![NFC_A.to_owned()],
                max_size: None,
                ndef_type: None,
                is_writable: None,
                can_make_read_only: None,
                ndef_message: None,
            })]
        );
    }

    #[test]
    fn formatable_only_test() {
        let sim = Arc::new(SimulatedTag::formatable(vec![1]));
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TechDiscovered, sim.tag()));

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TagEvent::NdefFormatable(_)));
    }

    #[test]
    fn ndef_only_test() {
        let stored = message("M");
        let sim = Arc::new(SimulatedTag::ndef(vec![1], Some(stored.clone()), Some(137)));
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TechDiscovered, sim.tag()));

        assert_eq!(events.len(), 1);
        match &events[0] {
            TagEvent::Ndef(info) => {
                assert_eq!(info.ndef_message, Some(stored));
                assert_eq!(info.max_size, Some(137));
                assert_eq!(info.is_writable, Some(true));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!sim.is_connected(NDEF));
    }

    #[test]
    fn failed_read_degrades_test() {
        let sim = Arc::new(
            SimulatedTag::ndef(vec![1], Some(message("slow")), None)
                .with_read_delay(Duration::from_secs(5)),
        );
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TechDiscovered, sim.tag()));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].info().ndef_message, None);

        let sim = Arc::new(SimulatedTag::ndef(vec![2], Some(message("gone")), None));
        let tag = sim.tag();
        sim.remove();
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TechDiscovered, tag));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].info().ndef_message, None);
    }

    #[test]
    fn inline_message_test() {
        let sim = Arc::new(SimulatedTag::plain(vec![1]));
        let first = message("first");
        let discovery = Discovery::new(DiscoveryAction::NdefDiscovered, sim.tag())
            .with_messages(vec![first.to_vec(), message("second").to_vec()]);

        let events = classifier().classify(&discovery);

        match &events[..] {
            [TagEvent::NdefMime(info)] => {
                assert_eq!(info.ndef_message, Some(first));
                assert_eq!(info.ndef_type.as_deref(), Some(PUSH_PROTOCOL_TYPE));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn tag_message_preferred_test() {
        let stored = message("stored");
        let sim = Arc::new(SimulatedTag::ndef(vec![1], Some(stored.clone()), None));
        let discovery = Discovery::new(DiscoveryAction::NdefDiscovered, sim.tag())
            .with_messages(vec![message("inline").to_vec()]);

        let events = classifier().classify(&discovery);

        assert_eq!(events[0].info().ndef_message, Some(stored));
        assert_ne!(events[0].info().ndef_type.as_deref(), Some(PUSH_PROTOCOL_TYPE));
    }

    #[test]
    fn event_json_test() {
        let sim = Arc::new(SimulatedTag::plain(vec![7]));
        let event = classifier().classify_reader(&sim.tag());

        assert_eq!(
            event.to_json().unwrap(),
            r#"{"type":"tag","tag":{"id":[7],"techTypes":[]}}"#
        );

        let sim = Arc::new(SimulatedTag::formatable(vec![7]));
        let events = classifier().classify(&Discovery::new(DiscoveryAction::TechDiscovered, sim.tag()));
        assert!(events[0].to_json().unwrap().starts_with(r#"{"type":"ndef-formatable""#));
    }
}
