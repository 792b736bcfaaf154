use crate::error::NdefError;
use crate::ndef::{NdefRecord, Tnf};

pub const RTD_TEXT: &[u8] = b"T";
pub const RTD_URI: &[u8] = b"U";

/// NFC Forum URI identifier codes, index is the code
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

impl NdefRecord {
    /// Well-known text record, UTF-8 encoded
    ///
    /// # Examples
    ///
    /// ```
    /// # use nfc_tag::ndef::*;
    /// let record = NdefRecord::text("en", "hello").unwrap();
    /// assert_eq!(record.payload(), b"\x02enhello");
    /// assert_eq!(record.to_text().unwrap(), "hello");
    /// ```
    pub fn text(language: &str, text: &str) -> Result<Self, NdefError> {
        let language = language.as_bytes();
        if language.len() > 0x3F {
            return Err(NdefError::FieldTooLong {
                field: "language",
                len: language.len(),
            });
        }

        let mut payload = Vec::with_capacity(1 + language.len() + text.len());
        payload.push(language.len() as u8);
        payload.extend_from_slice(language);
        payload.extend_from_slice(text.as_bytes());

        NdefRecord::new(Tnf::WellKnown, RTD_TEXT.to_vec(), vec![], payload)
    }

    /// Well-known URI record, the longest known prefix is abbreviated
    ///
    /// # Examples
    ///
    /// ```
    /// # use nfc_tag::ndef::*;
    /// let record = NdefRecord::uri("https://www.example.com").unwrap();
    /// assert_eq!(record.payload()[0], 0x02);
    /// assert_eq!(record.to_uri().unwrap(), "https://www.example.com");
    /// ```
    pub fn uri(uri: &str) -> Result<Self, NdefError> {
        let (code, prefix) = URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, prefix)| uri.starts_with(**prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(code, prefix)| (code as u8, prefix.len()))
            .unwrap_or((0, 0));

        let mut payload = vec![code];
        payload.extend_from_slice(uri[prefix..].as_bytes());

        NdefRecord::new(Tnf::WellKnown, RTD_URI.to_vec(), vec![], payload)
    }

    /// MIME media record, the type is normalized to lower case
    pub fn mime(mime_type: &str, payload: Vec<u8>) -> Result<Self, NdefError> {
        let mime_type = mime_type.trim().to_lowercase();
        if mime_type.is_empty() {
            return Err(NdefError::TypeRequired(Tnf::MimeMedia));
        }
        NdefRecord::new(Tnf::MimeMedia, mime_type.into_bytes(), vec![], payload)
    }

    /// External type record named `domain:type`
    pub fn external(domain: &str, external_type: &str, payload: Vec<u8>) -> Result<Self, NdefError> {
        let domain = domain.trim().to_lowercase();
        let external_type = external_type.trim().to_lowercase();
        if domain.is_empty() || external_type.is_empty() {
            return Err(NdefError::TypeRequired(Tnf::External));
        }

        let record_type = format!("{}:{}", domain, external_type);
        NdefRecord::new(Tnf::External, record_type.into_bytes(), vec![], payload)
    }

    /// Returns text of a well-known text record
    pub fn to_text(&self) -> Option<String> {
        if self.tnf() != Tnf::WellKnown || self.record_type() != RTD_TEXT {
            return None;
        }

        let payload = self.payload();
        let status = *payload.first()?;
        let text = payload.get(1 + (status & 0x3F) as usize..)?;

        if status & 0x80 != 0 {
            let units: Vec<u16> = text
                .chunks_exact(2)
                .map(|x| u16::from_be_bytes([x[0], x[1]]))
                .collect();
            String::from_utf16(&units).ok()
        } else {
            String::from_utf8(text.to_vec()).ok()
        }
    }

    /// Returns URI of a well-known URI record or an absolute URI record
    pub fn to_uri(&self) -> Option<String> {
        match self.tnf() {
            Tnf::AbsoluteUri => String::from_utf8(self.record_type().to_vec()).ok(),
            Tnf::WellKnown if self.record_type() == RTD_URI => {
                let payload = self.payload();
                let prefix = URI_PREFIXES.get(*payload.first()? as usize)?;
                let rest = std::str::from_utf8(&payload[1..]).ok()?;
                Some(format!("{}{}", prefix, rest))
            }
            _ => None,
        }
    }

    /// Returns MIME type this record is dispatched by
    ///
    /// Parameters after `;` are dropped, text records map to `text/plain`.
    pub fn mime_type(&self) -> Option<String> {
        match self.tnf() {
            Tnf::MimeMedia => {
                let raw = String::from_utf8_lossy(self.record_type()).to_lowercase();
                let mime_type = raw.split(';').next().unwrap_or("").trim();
                if mime_type.is_empty() {
                    None
                } else {
                    Some(mime_type.to_owned())
                }
            }
            Tnf::WellKnown if self.record_type() == RTD_TEXT => Some("text/plain".to_owned()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_prefix_test() {
        let record = NdefRecord::uri("tel:+123").unwrap();
        assert_eq!(record.payload(), b"\x05+123");

        let record = NdefRecord::uri("urn:epc:id:sgtin").unwrap();
        assert_eq!(record.payload()[0], 0x1E);
        assert_eq!(record.to_uri().unwrap(), "urn:epc:id:sgtin");

        let record = NdefRecord::uri("geo:1,2").unwrap();
        assert_eq!(record.payload(), b"\x00geo:1,2");
    }

    #[test]
    fn text_test() {
        let record = NdefRecord::text("fr", "bonjour").unwrap();
        assert_eq!(record.to_text().unwrap(), "bonjour");
        assert_eq!(record.mime_type().unwrap(), "text/plain");

        assert!(NdefRecord::text(&"x".repeat(64), "a").is_err());
    }

    #[test]
    fn mime_type_test() {
        let record = NdefRecord::mime("Text/VCard; charset=utf-8", vec![]).unwrap();
        assert_eq!(record.mime_type().unwrap(), "text/vcard");

        let record = NdefRecord::external("Example.com", "Thing", vec![1]).unwrap();
        assert_eq!(record.record_type(), b"example.com:thing");
        assert_eq!(record.mime_type(), None);

        assert!(NdefRecord::mime(" ", vec![]).is_err());
    }
}
