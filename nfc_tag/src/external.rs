//! Structured record form exchanged with the application layer
//!
//! A record crosses the boundary as
//! `{"tnf": 0-6, "type": "...", "id": "...", "payload": [bytes]}`.

use crate::error::NdefError;
use crate::ndef::{NdefMessage, NdefRecord, Tnf};

use std::convert::TryFrom;

use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub tnf: u8,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// Describes record for the application boundary
///
/// Type and id are rendered as text, invalid UTF-8 sequences are replaced.
pub fn to_external(record: &NdefRecord) -> ExternalRecord {
    ExternalRecord {
        tnf: record.tnf().value(),
        record_type: String::from_utf8_lossy(record.record_type()).into_owned(),
        id: String::from_utf8_lossy(record.id()).into_owned(),
        payload: record.payload().to_vec(),
    }
}

/// Builds record from its boundary description
///
/// # Examples
///
/// ```
/// # use nfc_tag::external::*;
/// let description = ExternalRecord {
///     tnf: 1,
///     record_type: "".to_owned(),
///     id: "".to_owned(),
///     payload: vec![],
/// };
/// assert!(from_external(description).is_err());
/// ```
pub fn from_external(description: ExternalRecord) -> Result<NdefRecord, NdefError> {
    let tnf = Tnf::try_from(description.tnf)?;
    if tnf.requires_type() && description.record_type.is_empty() {
        return Err(NdefError::TypeRequired(tnf));
    }

    NdefRecord::new(
        tnf,
        description.record_type.into_bytes(),
        description.id.into_bytes(),
        description.payload,
    )
}

/// Parses a JSON array of record descriptions
pub fn records_from_json(json: &str) -> Result<Vec<NdefRecord>, NdefError> {
    let descriptions: Vec<ExternalRecord> = serde_json::from_str(json)?;
    descriptions.into_iter().map(from_external).collect()
}

pub fn message_from_json(json: &str) -> Result<NdefMessage, NdefError> {
    NdefMessage::new(records_from_json(json)?)
}

pub fn message_to_json(message: &NdefMessage) -> Result<String, NdefError> {
    Ok(serde_json::to_string(message)?)
}

impl Serialize for NdefRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_external(self).serialize(serializer)
    }
}

impl Serialize for NdefMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records())
    }
}
