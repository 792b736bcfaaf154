use crate::classifier::TagClassifier;
use crate::event_channel::{EventChannel, PENDING_EVENT_VALIDITY};
use crate::radio::Radio;
use crate::service::NfcService;

use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(1);

pub struct NfcServiceBuilder<TRadio>
where
    TRadio: Radio,
{
    radio: Arc<TRadio>,
    pending_validity: Duration,
    discovery_timeout: Duration,
}

impl<TRadio> NfcServiceBuilder<TRadio>
where
    TRadio: Radio,
{
    pub fn new(radio: Arc<TRadio>) -> Self {
        Self {
            radio,
            pending_validity: PENDING_EVENT_VALIDITY,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// How long an event published with no listener stays deliverable
    pub fn set_pending_validity(mut self, validity: Duration) -> Self {
        self.pending_validity = validity;
        self
    }

    /// Upper bound for the transient read done while classifying a discovery
    pub fn set_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn finish(self) -> NfcService<TRadio> {
        NfcService::new(
            self.radio,
            EventChannel::with_validity(self.pending_validity),
            TagClassifier::new(self.discovery_timeout),
        )
    }
}
