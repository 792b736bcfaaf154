use crate::classifier::{Discovery, DiscoveryAction};
use crate::error::NfcError;

use nfc_tag::ndef::decode;
use nfc_tag::tag::NDEF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Any tag, tag-discovered action
    Tag,
    /// Tech-discovered action for tags advertising every listed technology
    Tech(Vec<String>),
    /// Ndef-discovered action for the MIME type of the first record
    Mime(String),
}

/// Discovery registrations currently requested from the platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().filter_map(|x| match x {
            Filter::Mime(mime_type) => Some(mime_type.as_str()),
            _ => None,
        })
    }

    pub fn tech_lists(&self) -> impl Iterator<Item = &[String]> {
        self.filters.iter().filter_map(|x| match x {
            Filter::Tech(list) => Some(list.as_slice()),
            _ => None,
        })
    }

    pub fn add_mime_type(&mut self, mime_type: &str) -> Result<(), NfcError> {
        let mime_type = validate_mime_type(mime_type)?;
        self.add(Filter::Mime(mime_type));
        Ok(())
    }

    pub fn remove_mime_type(&mut self, mime_type: &str) {
        let mime_type = mime_type.trim().to_lowercase();
        self.filters.retain(|x| *x != Filter::Mime(mime_type.clone()));
    }

    pub fn add_tech_list(&mut self, technologies: &[&str]) {
        self.add(Filter::Tech(technologies.iter().map(|x| x.to_string()).collect()));
    }

    pub fn remove_tech_list(&mut self, technologies: &[&str]) {
        self.filters.retain(|x| match x {
            Filter::Tech(list) => !list.iter().map(String::as_str).eq(technologies.iter().cloned()),
            _ => true,
        });
    }

    pub fn add_tag(&mut self) {
        self.add(Filter::Tag);
    }

    pub fn remove_tag(&mut self) {
        self.filters.retain(|x| *x != Filter::Tag);
    }

    /// Returns true if the platform should route this discovery here
    pub fn matches(&self, discovery: &Discovery) -> bool {
        let tag = &discovery.tag;
        match discovery.action {
            None => false,
            Some(DiscoveryAction::TagDiscovered) => self.filters.contains(&Filter::Tag),
            Some(DiscoveryAction::TechDiscovered) => self
                .tech_lists()
                .any(|list| list.iter().all(|x| tag.has_technology(x))),
            Some(DiscoveryAction::NdefDiscovered) => {
                let mime_type = discovery
                    .messages
                    .first()
                    .and_then(|raw| decode(raw).ok())
                    .and_then(|message| message.records()[0].mime_type());

                self.mime_types().any(|pattern| match &mime_type {
                    Some(mime_type) => mime_matches(pattern, mime_type),
                    None => tag.has_technology(NDEF),
                })
            }
        }
    }

    fn add(&mut self, filter: Filter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }
}

/// Normalizes `type/subtype`, both parts required
pub fn validate_mime_type(mime_type: &str) -> Result<String, NfcError> {
    let normalized = mime_type.trim().to_lowercase();
    let mut parts = normalized.splitn(2, '/');
    let main = parts.next().unwrap_or("");
    let sub = parts.next().unwrap_or("");

    let valid_part = |x: &str| !x.is_empty() && !x.chars().any(|c| c.is_whitespace() || c == '/');
    if valid_part(main) && valid_part(sub) {
        Ok(normalized)
    } else {
        Err(NfcError::InvalidMimeType(mime_type.to_owned()))
    }
}

fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    if pattern == "*/*" || pattern == mime_type {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') => mime_type.starts_with(prefix),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedTag;

    use std::sync::Arc;

    use nfc_tag::ndef::{NdefMessage, NdefRecord};
    use nfc_tag::tag::{TechCapabilities, NDEF_FORMATABLE, NFC_A};

    #[test]
    fn mime_type_validation_test() {
        assert_eq!(validate_mime_type(" Text/Plain ").unwrap(), "text/plain");
        assert_eq!(validate_mime_type("image/*").unwrap(), "image/*");

        for invalid in &["", "text", "text/", "/plain", "a/b/c", "te xt/plain"] {
            assert_eq!(
                validate_mime_type(invalid),
                Err(NfcError::InvalidMimeType(invalid.to_string()))
            );
        }
    }

    #[test]
    fn bookkeeping_test() {
        let mut filters = FilterSet::new();
        assert!(filters.is_empty());

        filters.add_mime_type("text/plain").unwrap();
        filters.add_mime_type("TEXT/PLAIN").unwrap();
        filters.add_tech_list(&[NDEF]);
        filters.add_tech_list(&[NDEF_FORMATABLE]);
        filters.add_tag();

        assert_eq!(filters.filters().len(), 4);
        assert_eq!(filters.mime_types().collect::<Vec<_>>(), vec!["text/plain"]);

        filters.remove_tech_list(&[NDEF]);
        filters.remove_mime_type("Text/Plain");
        filters.remove_tag();

        assert_eq!(
            filters.filters(),
            &[Filter::Tech(vec![NDEF_FORMATABLE.to_owned()])]
        );
    }

    #[test]
    fn matches_test() {
        let sim = Arc::new(
            SimulatedTag::ndef(vec![1], None, None)
                .with_technology(NFC_A, TechCapabilities::default()),
        );
        let tag = sim.tag();

        let mut filters = FilterSet::new();
        assert!(!filters.matches(&Discovery::new(DiscoveryAction::TagDiscovered, tag.clone())));

        filters.add_tag();
        filters.add_tech_list(&[NFC_A, NDEF]);
        filters.add_mime_type("text/*").unwrap();

        assert!(filters.matches(&Discovery::new(DiscoveryAction::TagDiscovered, tag.clone())));
        assert!(filters.matches(&Discovery::new(DiscoveryAction::TechDiscovered, tag.clone())));

        let text = NdefMessage::single(NdefRecord::text("en", "x").unwrap());
        let vcard = NdefMessage::single(NdefRecord::mime("application/vcard", vec![]).unwrap());
        assert!(filters.matches(
            &Discovery::new(DiscoveryAction::NdefDiscovered, tag.clone())
                .with_messages(vec![text.to_vec()])
        ));
        assert!(!filters.matches(
            &Discovery::new(DiscoveryAction::NdefDiscovered, tag.clone())
                .with_messages(vec![vcard.to_vec()])
        ));

        filters.remove_tech_list(&[NFC_A, NDEF]);
        filters.add_tech_list(&[NDEF_FORMATABLE]);
        assert!(!filters.matches(&Discovery::new(DiscoveryAction::TechDiscovered, tag)));
    }
}
