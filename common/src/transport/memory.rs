//! In-process transport
//!
//! Messages published through a [`MemoryPublisher`] (or on the transport
//! itself) are queued and delivered by [`Transport::poll_once`] in order.
//! Used by the tests and by `memq://` URLs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::{Dispatcher, MessageHandler, SubscriptionId, Transport, TransportError};

type Queued = (String, Vec<u8>);

/// Injects messages into a [`MemoryTransport`] from any thread
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    sender: Sender<Queued>,
    closed: Arc<AtomicBool>,
}

impl MemoryPublisher {
    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sender
            .send((channel.to_string(), payload.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    /// Close the transport. Messages already queued are still delivered,
    /// after which polling fails with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    publisher: MemoryPublisher,
    receiver: Receiver<Queued>,
    dispatcher: Dispatcher,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            publisher: MemoryPublisher {
                sender,
                closed: Arc::new(AtomicBool::new(false)),
            },
            receiver,
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        self.publisher.clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.dispatcher.len()
    }
}

impl Transport for MemoryTransport {
    fn subscribe(
        &mut self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError> {
        self.dispatcher.subscribe(pattern, handler)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        self.dispatcher.unsubscribe(id)
    }

    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.publisher.publish(channel, payload)
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let received = if self.publisher.closed.load(Ordering::SeqCst) {
            self.receiver.try_recv().map_err(|_| TransportError::Closed)?
        } else {
            match self.receiver.recv_timeout(timeout) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        };
        let (channel, payload) = received;
        self.dispatcher.dispatch(&channel, &payload);
        Ok(true)
    }

    fn description(&self) -> &str {
        "memq://"
    }
}
