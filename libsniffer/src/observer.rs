use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use crate::record::{PacketRecord, PacketSummary};

/// What the registry should do with an observer after a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Keep,
    /// Remove the observer; it will not be called again
    Detach,
}

/// Receives every record accepted by the capture loop
///
/// Observers are called on the capture thread, in registration order, right
/// after the record has been appended to the store.
pub trait PacketObserver: Send {
    fn name(&self) -> &'static str;

    fn on_packet(&mut self, record: &PacketRecord) -> Delivery;
}

/// Shorthand definition for a boxed observer
pub type BoxedObserver = Box<dyn PacketObserver>;

#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<BoxedObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry::default()
    }

    /// Return the count of attached observers
    pub fn num_observers(&self) -> usize {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn add(&self, observer: BoxedObserver) {
        debug!("observer registered: {}", observer.name());
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Notify all observers, dropping the ones that ask to be detached
    pub fn notify(&self, record: &PacketRecord) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain_mut(|o| match o.on_packet(record) {
            Delivery::Keep => true,
            Delivery::Detach => {
                debug!("observer detached: {}", o.name());
                false
            }
        });
    }
}

/// Publishes a `PacketSummary` for each record on a channel
pub struct SummaryChannel {
    sender: Sender<PacketSummary>,
}

impl SummaryChannel {
    pub fn new(sender: Sender<PacketSummary>) -> Self {
        SummaryChannel { sender }
    }

    /// Build an observer and the unbounded receiving end of its channel
    pub fn unbounded() -> (Self, Receiver<PacketSummary>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (SummaryChannel { sender }, receiver)
    }
}

impl PacketObserver for SummaryChannel {
    fn name(&self) -> &'static str {
        "SummaryChannel"
    }

    fn on_packet(&mut self, record: &PacketRecord) -> Delivery {
        match self.sender.send(record.summary()) {
            Ok(()) => Delivery::Keep,
            // receiver dropped
            Err(_) => Delivery::Detach,
        }
    }
}
