use crate::error::NdefError;

use std::convert::TryFrom;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

/// Upper bound for a single (possibly reassembled) record payload.
pub const MAX_PAYLOAD_SIZE: usize = 10 * (1 << 20);

/// Type Name Format: how the type field of a record is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tnf {
    Empty = 0,
    WellKnown = 1,
    MimeMedia = 2,
    AbsoluteUri = 3,
    External = 4,
    Unknown = 5,
    Unchanged = 6,
}

impl Tnf {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Returns true if records of this TNF are meaningless without a type
    pub fn requires_type(self) -> bool {
        matches!(
            self,
            Tnf::WellKnown | Tnf::MimeMedia | Tnf::AbsoluteUri | Tnf::External
        )
    }
}

impl TryFrom<u8> for Tnf {
    type Error = NdefError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tnf::Empty),
            1 => Ok(Tnf::WellKnown),
            2 => Ok(Tnf::MimeMedia),
            3 => Ok(Tnf::AbsoluteUri),
            4 => Ok(Tnf::External),
            5 => Ok(Tnf::Unknown),
            6 => Ok(Tnf::Unchanged),
            _ => Err(NdefError::InvalidTnf(value)),
        }
    }
}

/// Single immutable NDEF record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    tnf: Tnf,
    record_type: Vec<u8>,
    id: Vec<u8>,
    payload: Vec<u8>,
}

impl NdefRecord {
    /// Creates a record, checking the field constraints its TNF imposes
    ///
    /// # Examples:
    ///
    /// ```
    /// # use nfc_tag::ndef::*;
    /// let record = NdefRecord::new(Tnf::MimeMedia, b"text/plain".to_vec(), vec![], b"hi".to_vec())
    ///     .unwrap();
    /// assert_eq!(record.payload(), b"hi");
    ///
    /// assert!(NdefRecord::new(Tnf::Empty, vec![], vec![], vec![0x01]).is_err());
    /// ```
    pub fn new(
        tnf: Tnf,
        record_type: Vec<u8>,
        id: Vec<u8>,
        payload: Vec<u8>,
    ) -> Result<Self, NdefError> {
        if record_type.len() > 0xFF {
            return Err(NdefError::FieldTooLong {
                field: "type",
                len: record_type.len(),
            });
        }
        if id.len() > 0xFF {
            return Err(NdefError::FieldTooLong {
                field: "id",
                len: id.len(),
            });
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NdefError::PayloadTooLarge(payload.len()));
        }

        match tnf {
            Tnf::Empty => {
                if !record_type.is_empty() || !id.is_empty() || !payload.is_empty() {
                    return Err(NdefError::InvalidEmptyRecord);
                }
            }
            Tnf::Unknown => {
                if !record_type.is_empty() {
                    return Err(NdefError::TypeNotAllowed(tnf));
                }
            }
            Tnf::Unchanged => return Err(NdefError::UnexpectedUnchanged),
            _ => (),
        }

        Ok(Self {
            tnf,
            record_type,
            id,
            payload,
        })
    }

    /// Record with TNF_EMPTY and no fields, used to wipe a tag
    pub fn empty() -> Self {
        Self {
            tnf: Tnf::Empty,
            record_type: vec![],
            id: vec![],
            payload: vec![],
        }
    }

    pub fn tnf(&self) -> Tnf {
        self.tnf
    }

    pub fn record_type(&self) -> &[u8] {
        &self.record_type
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.tnf == Tnf::Empty
    }

    fn is_short(&self) -> bool {
        self.payload.len() <= 0xFF
    }

    /// Returns size of the encoded record in bytes
    pub fn len(&self) -> usize {
        let payload_len_field = if self.is_short() { 1 } else { 4 };
        let id_len_field = if self.id.is_empty() { 0 } else { 1 };

        2 + payload_len_field
            + id_len_field
            + self.record_type.len()
            + self.id.len()
            + self.payload.len()
    }

    fn write_to(&self, out: &mut Vec<u8>, begin: bool, end: bool) {
        let mut header = self.tnf.value();
        if begin {
            header |= FLAG_MB;
        }
        if end {
            header |= FLAG_ME;
        }
        if self.is_short() {
            header |= FLAG_SR;
        }
        if !self.id.is_empty() {
            header |= FLAG_IL;
        }

        out.push(header);
        out.push(self.record_type.len() as u8);

        if self.is_short() {
            out.push(self.payload.len() as u8);
        } else {
            let mut len = [0; 4];
            BigEndian::write_u32(&mut len, self.payload.len() as u32);
            out.extend_from_slice(&len);
        }

        if !self.id.is_empty() {
            out.push(self.id.len() as u8);
        }

        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
    }
}

/// Non-empty ordered sequence of records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Result<Self, NdefError> {
        if records.is_empty() {
            return Err(NdefError::EmptyMessage);
        }
        Ok(Self { records })
    }

    pub fn single(record: NdefRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    /// Message holding one TNF_EMPTY record
    pub fn empty() -> Self {
        Self::single(NdefRecord::empty())
    }

    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NdefRecord> {
        self.records
    }

    /// Returns size of the encoded message in bytes
    pub fn len(&self) -> usize {
        self.records.iter().fold(0, |sum, x| sum + x.len())
    }

    /// Returns true if the message is a single TNF_EMPTY record
    pub fn is_empty(&self) -> bool {
        self.records.len() == 1 && self.records[0].is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn from_vec(raw: &[u8]) -> Result<Self, NdefError> {
        decode(raw)
    }
}

/// Encodes message into its wire representation
///
/// Records are never chunked and use the short form whenever
/// the payload fits into one length byte.
///
/// # Examples
///
/// ```
/// # use nfc_tag::ndef::*;
/// assert_eq!(encode(&NdefMessage::empty()), vec![0xD0, 0x00, 0x00]);
/// ```
pub fn encode(message: &NdefMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len());
    let last = message.records.len() - 1;

    for (i, record) in message.records.iter().enumerate() {
        record.write_to(&mut out, i == 0, i == last);
    }

    out
}

struct ChunkSequence {
    tnf: Tnf,
    record_type: Vec<u8>,
    id: Vec<u8>,
    payload: Vec<u8>,
}

impl ChunkSequence {
    fn finish(self) -> Result<NdefRecord, NdefError> {
        NdefRecord::new(self.tnf, self.record_type, self.id, self.payload)
    }
}

/// Decodes wire bytes into a message, reassembling chunked records
///
/// # Examples
///
/// ```
/// # use nfc_tag::ndef::*;
/// let message = decode(&[0xD1, 0x01, 0x01, 0x55, 0x04]).unwrap();
/// assert_eq!(message.records()[0].tnf(), Tnf::WellKnown);
///
/// assert!(decode(&[0xD1, 0x01, 0x05, 0x55]).is_err());
/// ```
pub fn decode(raw: &[u8]) -> Result<NdefMessage, NdefError> {
    if raw.is_empty() {
        return Err(NdefError::EmptyMessage);
    }

    let mut cursor = Cursor::new(raw);
    let mut records = Vec::new();
    let mut chunk: Option<ChunkSequence> = None;
    let mut first = true;

    loop {
        let header = read_u8(&mut cursor)?;

        let begin = header & FLAG_MB != 0;
        if first && !begin {
            return Err(NdefError::MissingMessageBegin);
        }
        if !first && begin {
            return Err(NdefError::UnexpectedMessageBegin);
        }
        first = false;

        let tnf = Tnf::try_from(header & TNF_MASK)?;
        let type_len = read_u8(&mut cursor)? as usize;
        let payload_len = if header & FLAG_SR != 0 {
            read_u8(&mut cursor)? as usize
        } else {
            cursor
                .read_u32::<BigEndian>()
                .map_err(|_| NdefError::TruncatedHeader)? as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            read_u8(&mut cursor)? as usize
        } else {
            0
        };

        let record_type = read_field(&mut cursor, type_len)?;
        let id = read_field(&mut cursor, id_len)?;
        let payload = read_field(&mut cursor, payload_len)?;

        let chunked = header & FLAG_CF != 0;

        chunk = match chunk.take() {
            None => {
                if tnf == Tnf::Unchanged {
                    return Err(NdefError::UnexpectedUnchanged);
                }
                if chunked {
                    Some(ChunkSequence {
                        tnf,
                        record_type,
                        id,
                        payload,
                    })
                } else {
                    records.push(NdefRecord::new(tnf, record_type, id, payload)?);
                    None
                }
            }
            Some(mut sequence) => {
                if tnf != Tnf::Unchanged {
                    return Err(NdefError::NonContiguousChunk);
                }
                if !record_type.is_empty() || header & FLAG_IL != 0 {
                    return Err(NdefError::InvalidChunk);
                }

                sequence.payload.extend_from_slice(&payload);
                if sequence.payload.len() > MAX_PAYLOAD_SIZE {
                    return Err(NdefError::PayloadTooLarge(sequence.payload.len()));
                }

                if chunked {
                    Some(sequence)
                } else {
                    log::trace!("chunked record reassembled: {} bytes", sequence.payload.len());
                    records.push(sequence.finish()?);
                    None
                }
            }
        };

        if header & FLAG_ME != 0 {
            break;
        }
    }

    if chunk.is_some() {
        return Err(NdefError::UnterminatedChunk);
    }

    let trailing = remaining(&cursor);
    if trailing > 0 {
        return Err(NdefError::TrailingData(trailing));
    }

    NdefMessage::new(records)
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, NdefError> {
    cursor.read_u8().map_err(|_| NdefError::TruncatedHeader)
}

fn read_field(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, NdefError> {
    let found = remaining(cursor);
    if len > found {
        return Err(NdefError::TooShortBody {
            expected: len,
            found,
        });
    }

    let mut field = vec![0; len];
    cursor
        .read_exact(&mut field)
        .map_err(|_| NdefError::TooShortBody {
            expected: len,
            found,
        })?;
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(payload: &[u8]) -> NdefRecord {
        NdefRecord::new(
            Tnf::MimeMedia,
            b"application/x-test".to_vec(),
            vec![],
            payload.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn encode_short_record_test() {
        let record = NdefRecord::new(
            Tnf::WellKnown,
            b"T".to_vec(),
            vec![],
            b"\x02enhello".to_vec(),
        )
        .unwrap();
        let raw = encode(&NdefMessage::single(record));

        assert_eq!(
            raw,
            vec![0xD1, 0x01, 0x08, b'T', 0x02, b'e', b'n', b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn encode_long_record_test() {
        let record = mime(&[0xAB; 256]);
        let raw = encode(&NdefMessage::single(record));

        // no SR flag, four bytes of payload length
        assert_eq!(&raw[0..6], [0xC2, 18, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(raw.len(), 6 + 18 + 256);
    }

    #[test]
    fn encode_flags_test() {
        let with_id = NdefRecord::new(
            Tnf::External,
            b"example.com:a".to_vec(),
            b"id".to_vec(),
            vec![1],
        )
        .unwrap();
        let message = NdefMessage::new(vec![mime(&[1]), mime(&[2]), with_id]).unwrap();
        let raw = encode(&message);

        let second = mime(&[1]).len();
        let third = second + mime(&[2]).len();

        assert_eq!(raw[0], 0x80 | 0x10 | 0x02);
        assert_eq!(raw[second], 0x10 | 0x02);
        assert_eq!(raw[third], 0x40 | 0x10 | 0x08 | 0x04);
        assert_eq!(raw.len(), message.len());
    }

    #[test]
    fn round_trip_test() {
        let messages = vec![
            NdefMessage::empty(),
            NdefMessage::single(mime(b"payload")),
            NdefMessage::single(mime(&vec![0x11; 1000])),
            NdefMessage::new(vec![
                NdefRecord::new(Tnf::AbsoluteUri, b"urn:x".to_vec(), b"1".to_vec(), vec![]).unwrap(),
                NdefRecord::new(Tnf::Unknown, vec![], vec![], vec![0; 300]).unwrap(),
                mime(&[]),
            ])
            .unwrap(),
        ];

        for message in messages {
            assert_eq!(decode(&encode(&message)).unwrap(), message);
        }
    }

    #[test]
    fn decode_truncated_test() {
        let message = NdefMessage::new(vec![mime(b"first"), mime(b"second")]).unwrap();
        let raw = encode(&message);

        for len in 1..raw.len() {
            assert!(decode(&raw[..len]).is_err(), "prefix of {} bytes decoded", len);
        }
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn decode_length_overflow_test() {
        assert_eq!(
            decode(&[0xD2, 0x01, 0x10, b'a', 0x01]),
            Err(NdefError::TooShortBody {
                expected: 16,
                found: 1
            })
        );

        // long form claiming 4 GiB
        assert!(matches!(
            decode(&[0xC2, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(NdefError::TooShortBody { .. })
        ));
    }

    #[test]
    fn decode_chunked_test() {
        let mut raw = vec![0xB2, 10, 3];
        raw.extend_from_slice(b"text/plain");
        raw.extend_from_slice(b"abc");
        raw.extend_from_slice(&[0x36, 0, 2, b'd', b'e']);
        raw.extend_from_slice(&[0x56, 0, 1, b'f']);

        let message = decode(&raw).unwrap();

        assert_eq!(message.records().len(), 1);
        assert_eq!(message.records()[0].tnf(), Tnf::MimeMedia);
        assert_eq!(message.records()[0].record_type(), b"text/plain");
        assert_eq!(message.records()[0].payload(), b"abcdef");
    }

    #[test]
    fn decode_chunk_errors_test() {
        // chunk interrupted by a regular record
        let mut raw = vec![0xB2, 1, 1, b'x', 0x01];
        raw.extend_from_slice(&[0x52, 1, 0, b'y']);
        assert_eq!(decode(&raw), Err(NdefError::NonContiguousChunk));

        // continuation without a started chunk
        assert_eq!(
            decode(&[0xD6, 0x00, 0x00]),
            Err(NdefError::UnexpectedUnchanged)
        );

        // message ends inside a chunk
        assert_eq!(
            decode(&[0xF2, 1, 1, b'x', 0x01]),
            Err(NdefError::UnterminatedChunk)
        );

        // continuation carrying a type
        let mut raw = vec![0xB2, 1, 1, b'x', 0x01];
        raw.extend_from_slice(&[0x56, 1, 1, b'y', 0x02]);
        assert_eq!(decode(&raw), Err(NdefError::InvalidChunk));

        // continuation carrying an id
        let mut raw = vec![0xB2, 1, 1, b'x', 0x01];
        raw.extend_from_slice(&[0x5E, 0, 1, 1, b'i', 0x02]);
        assert_eq!(decode(&raw), Err(NdefError::InvalidChunk));
    }

    #[test]
    fn decode_structure_errors_test() {
        assert_eq!(
            decode(&[0x50, 0x00, 0x00]),
            Err(NdefError::MissingMessageBegin)
        );
        assert_eq!(
            decode(&[0x90, 0x00, 0x00, 0xD0, 0x00, 0x00]),
            Err(NdefError::UnexpectedMessageBegin)
        );
        assert_eq!(
            decode(&[0xD0, 0x00, 0x00, 0x00]),
            Err(NdefError::TrailingData(1))
        );
        assert_eq!(decode(&[0xD7, 0x00, 0x00]), Err(NdefError::InvalidTnf(7)));
        assert_eq!(
            decode(&[0xD0, 0x00, 0x01, 0x00]),
            Err(NdefError::InvalidEmptyRecord)
        );
    }

    #[test]
    fn record_validation_test() {
        assert!(NdefRecord::new(Tnf::Unchanged, vec![], vec![], vec![]).is_err());
        assert!(NdefRecord::new(Tnf::Unknown, b"x".to_vec(), vec![], vec![]).is_err());
        assert!(NdefRecord::new(Tnf::MimeMedia, vec![0; 256], vec![], vec![]).is_err());
        assert!(NdefMessage::new(vec![]).is_err());
        assert!(NdefMessage::empty().is_empty());
    }
}
