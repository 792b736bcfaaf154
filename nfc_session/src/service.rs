use crate::classifier::{Discovery, TagClassifier};
use crate::error::NfcError;
use crate::event_channel::{EventChannel, Listener};
use crate::filter_set::FilterSet;
use crate::radio::{Radio, RadioStatus};
use crate::session::{ConnectInfo, TagSession};

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use nfc_tag::external::message_from_json;
use nfc_tag::ndef::NdefMessage;
use nfc_tag::tag::{Tag, NDEF, NDEF_FORMATABLE};

/// Result of a command handed to a worker, resolved exactly once
pub struct Completion<T> {
    receiver: Receiver<Result<T, NfcError>>,
}

impl<T> Completion<T> {
    fn new(receiver: Receiver<Result<T, NfcError>>) -> Self {
        Self { receiver }
    }

    fn ready(result: Result<T, NfcError>) -> Self {
        let (sender, receiver) = channel();
        finish(sender, result);
        Self::new(receiver)
    }

    /// Blocks until the worker replies
    pub fn wait(self) -> Result<T, NfcError> {
        self.receiver.recv().map_err(|_| NfcError::ServiceStopped)?
    }
}

type Reply<T> = Sender<Result<T, NfcError>>;

enum SessionRequest {
    Connect {
        technology: String,
        tag: Tag,
        timeout: Option<Duration>,
        sender: Reply<ConnectInfo>,
    },
    Transceive {
        data: Vec<u8>,
        sender: Reply<Vec<u8>>,
    },
    Close {
        sender: Reply<()>,
    },
    Write {
        message: NdefMessage,
        tag: Tag,
        sender: Reply<()>,
    },
    Erase {
        tag: Tag,
        sender: Reply<()>,
    },
    MakeReadOnly {
        tag: Tag,
        sender: Reply<()>,
    },
    Read {
        tag: Tag,
        sender: Reply<Option<NdefMessage>>,
    },
}

impl SessionRequest {
    fn handle(self, session: &mut TagSession) {
        match self {
            SessionRequest::Connect {
                technology,
                tag,
                timeout,
                sender,
            } => finish(sender, session.connect(&technology, &tag, timeout)),
            SessionRequest::Transceive { data, sender } => {
                finish(sender, session.transceive(&data))
            }
            SessionRequest::Close { sender } => finish(sender, session.close()),
            SessionRequest::Write {
                message,
                tag,
                sender,
            } => finish(sender, session.write(&message, &tag)),
            SessionRequest::Erase { tag, sender } => finish(sender, session.erase(&tag)),
            SessionRequest::MakeReadOnly { tag, sender } => {
                finish(sender, session.make_read_only(&tag))
            }
            SessionRequest::Read { tag, sender } => finish(sender, session.read(&tag)),
        }
    }
}

fn finish<T>(sender: Reply<T>, result: Result<T, NfcError>) {
    if let Err(e) = &result {
        log::debug!("command failed: {}", e);
    }
    if sender.send(result).is_err() {
        log::trace!("receiving channel disconnected");
    }
}

enum DiscoveryJob {
    Dispatch(Discovery),
    ReaderMode(Tag),
}

type ReaderListener = Arc<Mutex<Option<Listener>>>;

/// Command surface of the NFC core
///
/// Radio I/O runs on two workers: one owns the single `TagSession`, the
/// other classifies discoveries and publishes them to the event channel.
/// Dropping the service stops both.
pub struct NfcService<TRadio>
where
    TRadio: Radio,
{
    radio: Arc<TRadio>,
    filters: Mutex<FilterSet>,
    channel: Arc<EventChannel>,
    reader_listener: ReaderListener,
    current_tag: Mutex<Option<Tag>>,
    session_sender: Mutex<Sender<SessionRequest>>,
    discovery_sender: Mutex<Sender<DiscoveryJob>>,
}

impl<TRadio> NfcService<TRadio>
where
    TRadio: Radio,
{
    pub(crate) fn new(radio: Arc<TRadio>, events: EventChannel, classifier: TagClassifier) -> Self {
        let events = Arc::new(events);
        let reader_listener: ReaderListener = Arc::new(Mutex::new(None));

        let (session_sender, session_receiver) = channel();
        thread::spawn(move || run_session_worker(session_receiver));

        let (discovery_sender, discovery_receiver) = channel();
        {
            let events = events.clone();
            let reader_listener = reader_listener.clone();
            thread::spawn(move || {
                run_discovery_worker(classifier, events, reader_listener, discovery_receiver)
            });
        }

        Self {
            radio,
            filters: Mutex::new(FilterSet::new()),
            channel: events,
            reader_listener,
            current_tag: Mutex::new(None),
            session_sender: Mutex::new(session_sender),
            discovery_sender: Mutex::new(discovery_sender),
        }
    }

    /// Registers the event listener, no radio status check
    pub fn attach_channel(&self, listener: Listener) {
        log::debug!("attach channel");
        self.channel.attach(listener);
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn status(&self) -> RadioStatus {
        self.radio.status()
    }

    pub fn enabled(&self) -> Result<(), NfcError> {
        self.ready()
    }

    /// Starts dispatch with the filters registered so far
    pub fn init(&self) -> Result<(), NfcError> {
        log::debug!("init");
        self.ready()?;
        self.restart_dispatch(&lock(&self.filters));
        Ok(())
    }

    pub fn filters(&self) -> FilterSet {
        lock(&self.filters).clone()
    }

    pub fn register_mime_type(&self, mime_type: &str) -> Result<(), NfcError> {
        log::debug!("register mime type {}", mime_type);
        self.ready()?;
        let mut filters = lock(&self.filters);
        filters.add_mime_type(mime_type)?;
        self.restart_dispatch(&filters);
        Ok(())
    }

    pub fn remove_mime_type(&self, mime_type: &str) -> Result<(), NfcError> {
        log::debug!("remove mime type {}", mime_type);
        self.update_filters(|x| x.remove_mime_type(mime_type))
    }

    pub fn register_ndef(&self) -> Result<(), NfcError> {
        log::debug!("register ndef");
        self.update_filters(|x| x.add_tech_list(&[NDEF]))
    }

    pub fn remove_ndef(&self) -> Result<(), NfcError> {
        log::debug!("remove ndef");
        self.update_filters(|x| x.remove_tech_list(&[NDEF]))
    }

    pub fn register_ndef_formatable(&self) -> Result<(), NfcError> {
        log::debug!("register ndef formatable");
        self.update_filters(|x| x.add_tech_list(&[NDEF_FORMATABLE]))
    }

    pub fn register_tag(&self) -> Result<(), NfcError> {
        log::debug!("register tag");
        self.update_filters(FilterSet::add_tag)
    }

    pub fn remove_tag(&self) -> Result<(), NfcError> {
        log::debug!("remove tag");
        self.update_filters(FilterSet::remove_tag)
    }

    /// Writes records given in the structured JSON form to the current tag
    pub fn write_tag(&self, records_json: &str) -> Completion<()> {
        log::debug!("write tag");
        if let Err(e) = self.ready() {
            return Completion::ready(Err(e));
        }
        match message_from_json(records_json) {
            Ok(message) => self.write_message(message),
            Err(e) => Completion::ready(Err(NfcError::InvalidRecord(e))),
        }
    }

    pub fn write_message(&self, message: NdefMessage) -> Completion<()> {
        log::debug!("write message of {} bytes", message.len());
        self.submit_with_tag(|tag, sender| SessionRequest::Write {
            message,
            tag,
            sender,
        })
    }

    pub fn erase_tag(&self) -> Completion<()> {
        log::debug!("erase tag");
        self.submit_with_tag(|tag, sender| SessionRequest::Erase { tag, sender })
    }

    pub fn make_read_only(&self) -> Completion<()> {
        log::debug!("make read only");
        self.submit_with_tag(|tag, sender| SessionRequest::MakeReadOnly { tag, sender })
    }

    pub fn read_tag(&self) -> Completion<Option<NdefMessage>> {
        log::debug!("read tag");
        self.submit_with_tag(|tag, sender| SessionRequest::Read { tag, sender })
    }

    pub fn connect(&self, technology: &str, timeout_ms: Option<u64>) -> Completion<ConnectInfo> {
        log::debug!("connect {} timeout {:?}", technology, timeout_ms);
        let technology = technology.to_owned();
        let timeout = timeout_ms.map(Duration::from_millis);
        self.submit_with_tag(|tag, sender| SessionRequest::Connect {
            technology,
            tag,
            timeout,
            sender,
        })
    }

    pub fn transceive(&self, data: Vec<u8>) -> Completion<Vec<u8>> {
        log::debug!("transceive {:02X?}", data);
        match self.ready() {
            Ok(_) => self.submit(|sender| SessionRequest::Transceive { data, sender }),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    pub fn close(&self) -> Completion<()> {
        log::debug!("close");
        match self.ready() {
            Ok(_) => self.submit(|sender| SessionRequest::Close { sender }),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// Entry point for discoveries routed by the platform
    pub fn on_discovery(&self, discovery: Discovery) -> Result<(), NfcError> {
        if discovery.action.is_some() && !discovery.from_history {
            *lock(&self.current_tag) = Some(discovery.tag.clone());
        }
        self.send_job(DiscoveryJob::Dispatch(discovery))
    }

    /// Reader mode delivers tags only to `listener`, nothing is postponed
    pub fn enable_reader_mode(&self, flags: u32, listener: Listener) -> Result<(), NfcError> {
        log::debug!("enable reader mode, flags {:#x}", flags);
        self.ready()?;
        *lock(&self.reader_listener) = Some(listener);
        self.radio.enable_reader_mode(flags);
        Ok(())
    }

    pub fn disable_reader_mode(&self) -> Result<(), NfcError> {
        log::debug!("disable reader mode");
        self.ready()?;
        *lock(&self.reader_listener) = None;
        self.radio.disable_reader_mode();
        Ok(())
    }

    /// Entry point for tags handed over by the radio in reader mode
    pub fn on_reader_tag(&self, tag: Tag) -> Result<(), NfcError> {
        *lock(&self.current_tag) = Some(tag.clone());
        self.send_job(DiscoveryJob::ReaderMode(tag))
    }

    /// Tag of the latest discovery
    pub fn current_tag(&self) -> Option<Tag> {
        lock(&self.current_tag).clone()
    }

    fn ready(&self) -> Result<(), NfcError> {
        self.radio.status().check()
    }

    fn update_filters<F>(&self, update: F) -> Result<(), NfcError>
    where
        F: FnOnce(&mut FilterSet),
    {
        self.ready()?;
        let mut filters = lock(&self.filters);
        update(&mut filters);
        self.restart_dispatch(&filters);
        Ok(())
    }

    fn restart_dispatch(&self, filters: &FilterSet) {
        self.radio.disable_dispatch();
        if filters.is_empty() {
            log::debug!("no filters registered, dispatch not started");
        } else {
            self.radio.enable_dispatch(filters);
        }
    }

    fn submit<T, F>(&self, request: F) -> Completion<T>
    where
        F: FnOnce(Reply<T>) -> SessionRequest,
    {
        let (sender, receiver) = channel();
        if lock(&self.session_sender).send(request(sender)).is_err() {
            log::error!("session worker stopped");
        }
        Completion::new(receiver)
    }

    fn submit_with_tag<T, F>(&self, request: F) -> Completion<T>
    where
        F: FnOnce(Tag, Reply<T>) -> SessionRequest,
    {
        let tag = self
            .ready()
            .and_then(|_| self.current_tag().ok_or(NfcError::NoTag));
        match tag {
            Ok(tag) => self.submit(|sender| request(tag, sender)),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    fn send_job(&self, job: DiscoveryJob) -> Result<(), NfcError> {
        lock(&self.discovery_sender)
            .send(job)
            .map_err(|_| NfcError::ServiceStopped)
    }
}

fn run_session_worker(receiver: Receiver<SessionRequest>) {
    let mut session = TagSession::new();

    loop {
        match receiver.recv() {
            Ok(request) => request.handle(&mut session),
            Err(_) => {
                log::trace!("sending channel disconnected");
                break;
            }
        }
    }

    if let Err(e) = session.close() {
        log::warn!("error on closing session: {}", e);
    }
}

fn run_discovery_worker(
    classifier: TagClassifier,
    channel: Arc<EventChannel>,
    reader_listener: ReaderListener,
    receiver: Receiver<DiscoveryJob>,
) {
    loop {
        match receiver.recv() {
            Ok(DiscoveryJob::Dispatch(discovery)) => {
                for event in classifier.classify(&discovery) {
                    channel.publish(event);
                }
            }
            Ok(DiscoveryJob::ReaderMode(tag)) => {
                let event = classifier.classify_reader(&tag);
                let listener = lock(&reader_listener).clone();
                match listener {
                    Some(listener) => listener(event),
                    None => log::info!("reader mode tag {:?} dropped, no listener", tag),
                }
            }
            Err(_) => {
                log::trace!("sending channel disconnected");
                break;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
