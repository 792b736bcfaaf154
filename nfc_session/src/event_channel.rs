use crate::classifier::TagEvent;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const PENDING_EVENT_VALIDITY: Duration = Duration::from_secs(30);

pub type Listener = Arc<dyn Fn(TagEvent) + Send + Sync>;

struct PendingEvent {
    event: TagEvent,
    created: Instant,
}

#[derive(Default)]
struct ChannelState {
    listener: Option<Listener>,
    pending: Option<PendingEvent>,
}

/// Delivers events to the attached listener, or keeps the latest one
/// until a listener attaches within the validity window
///
/// Listeners run with the delivery lock held, so events reach them in
/// publish order. A listener must not publish or attach on the same channel.
pub struct EventChannel {
    state: Mutex<ChannelState>,
    delivery: Mutex<()>,
    validity: Duration,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_validity(PENDING_EVENT_VALIDITY)
    }

    pub fn with_validity(validity: Duration) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            delivery: Mutex::new(()),
            validity,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Replaces the listener, handing it a still valid pending event
    pub fn attach(&self, listener: Listener) {
        self.attach_at(listener, Instant::now())
    }

    pub fn attach_at(&self, listener: Listener, now: Instant) {
        let _delivery = self.deliver();
        let pending = {
            let mut state = self.lock();
            state.listener = Some(listener.clone());
            state.pending.take()
        };

        if let Some(pending) = pending {
            let age = now.saturating_duration_since(pending.created);
            if age < self.validity {
                log::info!("delivering postponed event, {:?} old", age);
                listener(pending.event);
            } else {
                log::info!("postponed event discarded, {:?} old", age);
            }
        }
    }

    pub fn publish(&self, event: TagEvent) {
        self.publish_at(event, Instant::now())
    }

    pub fn publish_at(&self, event: TagEvent, now: Instant) {
        let _delivery = self.deliver();
        let mut state = self.lock();
        match state.listener.clone() {
            Some(listener) => {
                drop(state);
                listener(event);
            }
            None => {
                log::info!("no listener attached, event postponed");
                state.pending = Some(PendingEvent {
                    event,
                    created: now,
                });
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
