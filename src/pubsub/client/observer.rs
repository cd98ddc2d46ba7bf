use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use super::TransportError;
use crate::pubsub::{message::Envelope, EventKind};

/// A listener failed while handling an event
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    /// event kind
    pub kind: EventKind,
    /// event data the listener received
    pub data: Value,
    /// failure message
    pub detail: String,
}

/// Connection closed by peer or dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClosed {
    /// websocket close code, if the server sent a close frame
    pub code: Option<u16>,
    /// close reason or error description
    pub reason: String,
}

/// Four independent observation channels, each can have any number of receivers.
///
/// Sending never blocks: when no receiver exists the item is dropped, slow receivers lag.
#[derive(Debug, Clone)]
pub struct Observers {
    messages: broadcast::Sender<Envelope>,
    dispatch_errors: broadcast::Sender<DispatchFailure>,
    closed: broadcast::Sender<ConnectionClosed>,
    transport_errors: broadcast::Sender<Arc<TransportError>>,
}

impl Observers {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: broadcast::channel(capacity).0,
            dispatch_errors: broadcast::channel(capacity).0,
            closed: broadcast::channel(capacity).0,
            transport_errors: broadcast::channel(capacity).0,
        }
    }

    /// every decoded inbound envelope
    pub fn messages(&self) -> broadcast::Receiver<Envelope> {
        self.messages.subscribe()
    }

    /// listener failures
    pub fn dispatch_errors(&self) -> broadcast::Receiver<DispatchFailure> {
        self.dispatch_errors.subscribe()
    }

    /// each abnormal disconnect
    pub fn connection_closed(&self) -> broadcast::Receiver<ConnectionClosed> {
        self.closed.subscribe()
    }

    /// open, send and receive failures
    pub fn transport_errors(&self) -> broadcast::Receiver<Arc<TransportError>> {
        self.transport_errors.subscribe()
    }

    pub(crate) fn message(&self, envelope: &Envelope) {
        if self.messages.send(envelope.clone()).is_err() {
            log::trace!("No message observer, drop {} envelope", envelope.kind.as_str());
        }
    }

    pub(crate) fn dispatch_error(&self, failure: DispatchFailure) {
        if self.dispatch_errors.send(failure).is_err() {
            log::trace!("No dispatch error observer");
        }
    }

    pub(crate) fn closed(&self, closed: ConnectionClosed) {
        if self.closed.send(closed).is_err() {
            log::trace!("No connection closed observer");
        }
    }

    pub(crate) fn transport_error(&self, err: Arc<TransportError>) {
        if self.transport_errors.send(err).is_err() {
            log::trace!("No transport error observer");
        }
    }
}
