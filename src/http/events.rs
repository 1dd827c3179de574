//! Lifecycle events and the observer fan-out.
//!
//! Observers are invoked synchronously, in attachment order, before
//! [`EventBus::publish`] returns. An observer may fail a data event, which
//! aborts the send with that error (used for download size limits).

use crate::base::neterror::NetError;
use crate::http::response::HttpResponse;
use std::fmt;
use std::sync::{Arc, Mutex};

/// One lifecycle event of an exchange.
#[derive(Debug, Clone, Copy)]
pub enum NetEvent<'a> {
    /// The exact request head written to the wire.
    SentHeaders(&'a str),
    /// Number of body bytes written by one write.
    SentBodyPart(usize),
    /// Total body bytes written in this exchange.
    SentBody(u64),
    /// Final (non-1xx) response head.
    ReceivedHeaders(&'a HttpResponse),
    /// One decoded body fragment.
    ReceivedBodyPart(&'a [u8]),
    /// The complete response.
    ReceivedBody(&'a HttpResponse),
    Warning(&'a str),
}

impl NetEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            NetEvent::SentHeaders(_) => "sentHeaders",
            NetEvent::SentBodyPart(_) => "sentBodyPart",
            NetEvent::SentBody(_) => "sentBody",
            NetEvent::ReceivedHeaders(_) => "receivedHeaders",
            NetEvent::ReceivedBodyPart(_) => "receivedBodyPart",
            NetEvent::ReceivedBody(_) => "receivedBody",
            NetEvent::Warning(_) => "warning",
        }
    }
}

/// Receives lifecycle events.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &NetEvent<'_>) -> Result<(), NetError>;
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn Observer>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer. Attaching the same `Arc` twice has no effect.
    pub fn attach(&mut self, observer: Arc<dyn Observer>) {
        if !self.observers.iter().any(|o| same_observer(o, &observer)) {
            self.observers.push(observer);
        }
    }

    /// Detach an observer; a no-op when it was never attached.
    pub fn detach(&mut self, observer: &Arc<dyn Observer>) {
        self.observers.retain(|o| !same_observer(o, observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer. The first observer error stops
    /// delivery and is returned.
    pub fn publish(&self, event: &NetEvent<'_>) -> Result<(), NetError> {
        for observer in &self.observers {
            observer.on_event(event)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Records event names, collapsing immediate repeats.
///
/// With a watch list only those events are recorded. Useful for asserting
/// the shape of an exchange without counting individual body fragments.
#[derive(Debug, Default)]
pub struct EventSequence {
    watched: Vec<&'static str>,
    sequence: Mutex<Vec<&'static str>>,
}

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watching(events: &[&'static str]) -> Self {
        Self {
            watched: events.to_vec(),
            sequence: Mutex::new(Vec::new()),
        }
    }

    pub fn sequence(&self) -> Vec<&'static str> {
        self.sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Observer for EventSequence {
    fn on_event(&self, event: &NetEvent<'_>) -> Result<(), NetError> {
        let name = event.name();
        if !self.watched.is_empty() && !self.watched.contains(&name) {
            return Ok(());
        }
        let mut sequence = self
            .sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sequence.last() != Some(&name) {
            sequence.push(name);
        }
        Ok(())
    }
}
