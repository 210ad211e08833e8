//! Event Bus
//!
//! One broadcast topic carrying every [`Event`]. Each subscriber has its own
//! bounded buffer: publishing never waits for anybody, and a subscriber that
//! falls more than a buffer behind is disconnected instead of slowing the
//! pipeline. Events published before a subscriber joined are not replayed.

use std::sync::Arc;
use std::time::Duration;

use guardian_core::Event;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Events buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Idle time after which subscribers get a keepalive
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);

pub struct EventBus {
    tx: broadcast::Sender<Arc<Event>>,
    closed: CancellationToken,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus {
            tx,
            closed: CancellationToken::new(),
        }
    }

    /// Hand `event` to every current subscriber. Returns how many there were;
    /// with nobody listening the event is simply dropped.
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            closed: self.closed.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// End every subscription, used on shutdown so that long-lived streams
    /// do not hold the server open.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(Arc<Event>),
    /// Nothing happened within the keepalive interval
    Keepalive,
    /// The bus was closed, or this subscriber fell behind and was dropped
    Closed,
}

pub struct Subscription {
    rx: broadcast::Receiver<Arc<Event>>,
    closed: CancellationToken,
}

impl Subscription {
    /// Wait for the next event, at most `keepalive`.
    pub async fn next(&mut self, keepalive: Duration) -> Delivery {
        tokio::select! {
            _ = self.closed.cancelled() => Delivery::Closed,
            r = tokio::time::timeout(keepalive, self.rx.recv()) => match r {
                Err(_) => Delivery::Keepalive,
                Ok(Ok(event)) => Delivery::Event(event),
                Ok(Err(RecvError::Lagged(missed))) => {
                    log::warn!("Subscriber missed {} events, disconnecting", missed);
                    Delivery::Closed
                }
                Ok(Err(RecvError::Closed)) => Delivery::Closed,
            },
        }
    }
}
