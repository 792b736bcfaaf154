//! In-memory radio and tags, for tests and demos without hardware

use crate::filter_set::FilterSet;
use crate::radio::{Radio, RadioStatus};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use cancellation::CancellationToken;

use nfc_tag::error::LinkError;
use nfc_tag::ndef::NdefMessage;
use nfc_tag::tag::{NdefStatus, Tag, TagLink, TechCapabilities, NDEF, NDEF_FORMATABLE};

pub type Responder = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

const NDEF_TYPE: &str = "org.nfcforum.ndef.type2";

struct TagState {
    present: bool,
    connected: Vec<String>,
    ndef_capable: bool,
    formatable: bool,
    stored: Option<Vec<u8>>,
    writable: bool,
    can_make_read_only: bool,
    fail_close: bool,
    remove_on_set_timeout: bool,
    timeouts: HashMap<String, Duration>,
    ndef_writes: usize,
}

pub struct SimulatedTag {
    id: Vec<u8>,
    max_size: Option<usize>,
    technologies: Vec<(String, TechCapabilities)>,
    read_delay: Duration,
    responder: Option<Responder>,
    state: Mutex<TagState>,
}

impl SimulatedTag {
    fn new(id: Vec<u8>, max_size: Option<usize>, ndef_capable: bool, formatable: bool) -> Self {
        Self {
            id,
            max_size,
            technologies: vec![],
            read_delay: Duration::from_millis(0),
            responder: None,
            state: Mutex::new(TagState {
                present: true,
                connected: vec![],
                ndef_capable,
                formatable,
                stored: None,
                writable: true,
                can_make_read_only: true,
                fail_close: false,
                remove_on_set_timeout: false,
                timeouts: HashMap::new(),
                ndef_writes: 0,
            }),
        }
    }

    /// NDEF formatted tag, optionally holding a message
    pub fn ndef(id: Vec<u8>, stored: Option<NdefMessage>, max_size: Option<usize>) -> Self {
        let tag = Self::new(id, max_size, true, false);
        tag.lock().stored = stored.map(|x| x.to_vec());
        tag
    }

    /// Blank tag that can be formatted for NDEF
    pub fn formatable(id: Vec<u8>) -> Self {
        Self::new(id, None, false, true)
    }

    /// Tag with raw technologies only
    pub fn plain(id: Vec<u8>) -> Self {
        Self::new(id, None, false, false)
    }

    pub fn with_technology(mut self, technology: &str, capabilities: TechCapabilities) -> Self {
        self.technologies.push((technology.to_owned(), capabilities));
        self
    }

    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Delays every NDEF read, simulating a slow tag
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn read_only(self) -> Self {
        self.lock().writable = false;
        self
    }

    /// Writable tag that refuses to be made read only
    pub fn locked(self) -> Self {
        self.lock().can_make_read_only = false;
        self
    }

    /// Handle advertising this tag's technologies
    pub fn tag(self: &Arc<Self>) -> Tag {
        let state = self.lock();
        let mut tech_list: Vec<String> = self.technologies.iter().map(|(x, _)| x.clone()).collect();
        if state.ndef_capable {
            tech_list.push(NDEF.to_owned());
        }
        if state.formatable {
            tech_list.push(NDEF_FORMATABLE.to_owned());
        }
        drop(state);

        Tag::new(self.id.clone(), tech_list, self.max_size, self.clone())
    }

    /// Takes the tag out of the field
    pub fn remove(&self) {
        let mut state = self.lock();
        state.present = false;
        state.connected.clear();
    }

    /// Makes every following close report an I/O error
    pub fn fail_close(&self) {
        self.lock().fail_close = true;
    }

    /// Takes the tag out of the field on the next timeout change
    pub fn remove_on_set_timeout(&self) {
        self.lock().remove_on_set_timeout = true;
    }

    pub fn stored_message(&self) -> Option<Vec<u8>> {
        self.lock().stored.clone()
    }

    pub fn ndef_writes(&self) -> usize {
        self.lock().ndef_writes
    }

    pub fn is_connected(&self, technology: &str) -> bool {
        self.lock().connected.iter().any(|x| x == technology)
    }

    pub fn timeout(&self, technology: &str) -> Option<Duration> {
        self.lock().timeouts.get(technology).cloned()
    }

    fn has_technology(&self, state: &TagState, technology: &str) -> bool {
        match technology {
            NDEF => state.ndef_capable,
            NDEF_FORMATABLE => state.formatable,
            _ => self.technologies.iter().any(|(x, _)| x == technology),
        }
    }

    fn present(&self) -> Result<MutexGuard<'_, TagState>, LinkError> {
        let state = self.lock();
        if state.present {
            Ok(state)
        } else {
            Err(LinkError::TagLost)
        }
    }

    fn lock(&self) -> MutexGuard<'_, TagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TagLink for SimulatedTag {
    fn is_present(&self) -> bool {
        self.lock().present
    }

    fn connect(&self, technology: &str) -> Result<(), LinkError> {
        let mut state = self.present()?;
        if !self.has_technology(&state, technology) {
            return Err(LinkError::Io(format!("{} not available", technology)));
        }
        state.connected.push(technology.to_owned());
        Ok(())
    }

    fn close(&self, technology: &str) -> Result<(), LinkError> {
        let mut state = self.lock();
        if let Some(i) = state.connected.iter().position(|x| x == technology) {
            state.connected.remove(i);
        }
        if state.fail_close {
            return Err(LinkError::Io(format!("error closing {}", technology)));
        }
        Ok(())
    }

    fn capabilities(&self, technology: &str) -> TechCapabilities {
        self.technologies
            .iter()
            .find(|(x, _)| x == technology)
            .map(|(_, capabilities)| *capabilities)
            .unwrap_or_default()
    }

    fn set_timeout(&self, technology: &str, timeout: Duration) -> Result<(), LinkError> {
        let mut state = self.present()?;
        if state.remove_on_set_timeout {
            state.present = false;
            state.connected.clear();
            return Err(LinkError::TagLost);
        }
        state.timeouts.insert(technology.to_owned(), timeout);
        Ok(())
    }

    fn transceive(&self, technology: &str, data: &[u8]) -> Result<Vec<u8>, LinkError> {
        let state = self.present()?;
        if !state.connected.iter().any(|x| x == technology) {
            return Err(LinkError::Io(format!("{} not connected", technology)));
        }
        drop(state);

        Ok(match &self.responder {
            Some(responder) => responder(data),
            None => data.to_vec(),
        })
    }

    fn ndef_status(&self) -> Result<NdefStatus, LinkError> {
        let state = self.present()?;
        Ok(NdefStatus {
            ndef_type: NDEF_TYPE.to_owned(),
            writable: state.writable,
            can_make_read_only: state.can_make_read_only,
        })
    }

    fn read_ndef(&self, ct: &CancellationToken) -> Result<Option<Vec<u8>>, LinkError> {
        let started = Instant::now();
        while started.elapsed() < self.read_delay {
            ct.result()?;
            thread::sleep(Duration::from_millis(5));
        }

        Ok(self.present()?.stored.clone())
    }

    fn write_ndef(&self, raw: &[u8]) -> Result<(), LinkError> {
        let mut state = self.present()?;
        if !state.writable {
            return Err(LinkError::Io("tag is read only".to_owned()));
        }
        state.stored = Some(raw.to_vec());
        state.ndef_writes += 1;
        Ok(())
    }

    fn make_read_only(&self) -> Result<bool, LinkError> {
        let mut state = self.present()?;
        if !state.can_make_read_only {
            return Ok(false);
        }
        state.writable = false;
        Ok(true)
    }

    fn format_ndef(&self, raw: &[u8]) -> Result<(), LinkError> {
        let mut state = self.present()?;
        if !state.formatable {
            return Err(LinkError::Io("tag is already formatted".to_owned()));
        }
        state.formatable = false;
        state.ndef_capable = true;
        state.stored = Some(raw.to_vec());
        Ok(())
    }
}

struct RadioState {
    status: RadioStatus,
    dispatch: Option<FilterSet>,
    restarts: usize,
    reader_flags: Option<u32>,
}

/// Radio whose foreground dispatch is just recorded
pub struct SimulatedRadio {
    state: Mutex<RadioState>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RadioState {
                status: RadioStatus::Ready,
                dispatch: None,
                restarts: 0,
                reader_flags: None,
            }),
        }
    }

    pub fn set_status(&self, status: RadioStatus) {
        self.lock().status = status;
    }

    /// Filters the dispatch is currently enabled with
    pub fn dispatch(&self) -> Option<FilterSet> {
        self.lock().dispatch.clone()
    }

    /// Number of times dispatch was disabled
    pub fn restarts(&self) -> usize {
        self.lock().restarts
    }

    pub fn reader_mode(&self) -> bool {
        self.lock().reader_flags.is_some()
    }

    /// Flags reader mode was enabled with
    pub fn reader_flags(&self) -> Option<u32> {
        self.lock().reader_flags
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for SimulatedRadio {
    fn status(&self) -> RadioStatus {
        self.lock().status
    }

    fn enable_dispatch(&self, filters: &FilterSet) {
        self.lock().dispatch = Some(filters.clone());
    }

    fn disable_dispatch(&self) {
        let mut state = self.lock();
        state.dispatch = None;
        state.restarts += 1;
    }

    fn enable_reader_mode(&self, flags: u32) {
        self.lock().reader_flags = Some(flags);
    }

    fn disable_reader_mode(&self) {
        self.lock().reader_flags = None;
    }
}
