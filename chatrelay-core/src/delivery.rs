// ABOUTME: Outbound delivery queue for the Steam backend
// ABOUTME: Buffers messages while unauthenticated and flushes them FIFO on authentication

use anyhow::{Context, Result};
use std::collections::VecDeque;

use crate::traits::{OutboundMessage, RelaySink};

/// Authentication state of the Steam session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
}

/// What `enqueue_or_send` did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// FIFO of messages waiting for an authenticated session.
///
/// Invariant: `pending` is empty whenever `state` is `Authenticated`.
/// Exclusive `&mut self` access makes every flush run to completion before
/// the next enqueue is looked at.
#[derive(Debug)]
pub struct DeliveryQueue {
    state: ConnectionState,
    pending: VecDeque<OutboundMessage>,
}

impl DeliveryQueue {
    /// New queue in the `Connecting` state
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Messages currently waiting, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.pending.iter()
    }

    /// Send now if authenticated, otherwise append to the tail.
    ///
    /// A failed immediate send demotes the state to `Disconnected` and keeps
    /// the message queued, so it goes out with the next flush.
    pub fn enqueue_or_send(&mut self, sink: &dyn RelaySink, message: OutboundMessage) -> Delivery {
        if self.state != ConnectionState::Authenticated {
            self.pending.push_back(message);
            return Delivery::Queued;
        }

        match sink.send(message.clone()) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::warn!(
                    network = %sink.network(),
                    error = %e,
                    "Immediate send failed, queueing until next authentication"
                );
                self.state = ConnectionState::Disconnected;
                self.pending.push_back(message);
                Delivery::Queued
            }
        }
    }

    /// Mark the session authenticated and drain the queue in order.
    ///
    /// Returns how many messages were flushed. If the sink fails part way,
    /// the failed message and everything after it stay queued, the state
    /// drops back to `Disconnected`, and the error is returned.
    pub fn on_authenticated(&mut self, sink: &dyn RelaySink) -> Result<usize> {
        self.state = ConnectionState::Authenticated;

        let mut flushed = 0;
        while let Some(message) = self.pending.pop_front() {
            if let Err(e) = sink.send(message.clone()) {
                self.pending.push_front(message);
                self.state = ConnectionState::Disconnected;
                return Err(e).with_context(|| {
                    format!(
                        "Flush to {} failed after {} message(s), {} still queued",
                        sink.network(),
                        flushed,
                        self.pending.len()
                    )
                });
            }
            flushed += 1;
        }

        Ok(flushed)
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}
