use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nfc_session::classifier::{Discovery, DiscoveryAction, TagEvent};
use nfc_session::error::NfcError;
use nfc_session::service::NfcService;
use nfc_session::service_builder::NfcServiceBuilder;
use nfc_session::simulated::{SimulatedRadio, SimulatedTag};

use nfc_tag::external::message_to_json;
use nfc_tag::ndef::{NdefMessage, NdefRecord};
use nfc_tag::tag::{TechCapabilities, ISO_DEP};

fn main() {
    simple_logger::init().unwrap();

    let radio = Arc::new(SimulatedRadio::new());
    let service = NfcServiceBuilder::new(radio.clone())
        .set_discovery_timeout(Duration::from_millis(500))
        .finish();
    log::info!("radio status: {}, ping: {}", service.status().as_str(), service.ping());

    service.register_ndef().unwrap();
    service.register_mime_type("text/plain").unwrap();
    println!("Dispatch filters: {:?}", radio.dispatch());

    let stored = NdefMessage::single(NdefRecord::text("en", "hello").unwrap());
    let sim = Arc::new(
        SimulatedTag::ndef(vec![0x04, 0xA2, 0x1F, 0x6B], Some(stored), Some(137)).with_technology(
            ISO_DEP,
            TechCapabilities {
                transceive: true,
                configurable_timeout: true,
                max_transceive_length: Some(261),
            },
        ),
    );

    // tag arrives before anyone listens, event is postponed
    service
        .on_discovery(Discovery::new(DiscoveryAction::TechDiscovered, sim.tag()))
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let (sender, receiver) = channel();
    let sender = Mutex::new(sender);
    service.attach_channel(Arc::new(move |event: TagEvent| {
        let _ = sender.lock().unwrap().send(event);
    }));
    if let Ok(event) = receiver.recv_timeout(Duration::from_secs(1)) {
        println!("Event: {}", event.to_json().unwrap());
    }

    if let Err(e) = write_and_read(&service) {
        println!("Write failed [{}]: {}", e.kind(), e);
    }

    if let Err(e) = exchange_apdu(&service) {
        println!("Exchange failed [{}]: {}", e.kind(), e);
    }

    sim.remove();
    match service.read_tag().wait() {
        Ok(_) => println!("Tag still readable"),
        Err(e) => println!("Read after removal [{}]: {}", e.kind(), e),
    }
}

fn write_and_read(service: &NfcService<SimulatedRadio>) -> Result<(), NfcError> {
    service
        .write_tag(r#"[{"tnf":1,"type":"U","id":"","payload":[4,101,120,97,109,112,108,101,46,99,111,109]}]"#)
        .wait()?;

    if let Some(message) = service.read_tag().wait()? {
        println!("Read back: {}", message_to_json(&message)?);
        for record in message.records() {
            if let Some(uri) = record.to_uri() {
                println!("URI: {}", uri);
            }
        }
    }
    Ok(())
}

fn exchange_apdu(service: &NfcService<SimulatedRadio>) -> Result<(), NfcError> {
    let info = service.connect(ISO_DEP, Some(500)).wait()?;
    println!("Connected to {}: {:?}", ISO_DEP, info);

    let response = service.transceive(vec![0x00, 0xA4, 0x04, 0x00]).wait()?;
    println!("Response: {:02X?}", response);

    service.close().wait()
}
