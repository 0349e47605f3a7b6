//! Internal publish/subscribe bus decoupling stream sessions from consumers.
//!
//! Listeners register per event kind and are notified in registration order.
//! A panicking listener is isolated and logged; remaining listeners for the
//! same event still run. Listeners receive no cancellation token.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::session::ContentDescriptor;

/// Events published by the streaming subsystem.
///
/// Consumed by UI and analytics listeners outside this crate.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Playback began, either through a resolved gateway or the local
    /// fallback source (`fallback = true`).
    StreamStarted {
        content_id: String,
        gateway: String,
        metadata: ContentDescriptor,
        fallback: bool,
    },
    /// A stream attempt failed before reaching playback.
    StreamError { content_id: String, error: String },
    /// The session was stopped.
    StreamStopped,
    /// A metered payment channel was opened for a playing stream.
    PaymentChannelOpened { channel_id: Uuid, content_id: String },
    /// A payment channel transitioned to closed.
    PaymentChannelClosed { channel_id: Uuid },
    /// One settlement tick was recorded on an open channel.
    PaymentProcessed {
        channel_id: Uuid,
        content_id: String,
        timestamp: DateTime<Utc>,
    },
    /// One unit of viewing time elapsed while playing.
    StreamTick {
        content_id: String,
        tick_count: u64,
        seconds: u64,
        channel_id: Uuid,
    },
    /// Tokens were purchased during the access top-up step.
    TokensPurchased { amount: u64 },
}

/// Discriminant used for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StreamStarted,
    StreamError,
    StreamStopped,
    PaymentChannelOpened,
    PaymentChannelClosed,
    PaymentProcessed,
    StreamTick,
    TokensPurchased,
}

impl EventKind {
    /// All event kinds, for consumers that want the full firehose.
    pub const ALL: [EventKind; 8] = [
        EventKind::StreamStarted,
        EventKind::StreamError,
        EventKind::StreamStopped,
        EventKind::PaymentChannelOpened,
        EventKind::PaymentChannelClosed,
        EventKind::PaymentProcessed,
        EventKind::StreamTick,
        EventKind::TokensPurchased,
    ];
}

impl StreamEvent {
    /// Returns the kind listeners subscribe under.
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::StreamStarted { .. } => EventKind::StreamStarted,
            StreamEvent::StreamError { .. } => EventKind::StreamError,
            StreamEvent::StreamStopped => EventKind::StreamStopped,
            StreamEvent::PaymentChannelOpened { .. } => EventKind::PaymentChannelOpened,
            StreamEvent::PaymentChannelClosed { .. } => EventKind::PaymentChannelClosed,
            StreamEvent::PaymentProcessed { .. } => EventKind::PaymentProcessed,
            StreamEvent::StreamTick { .. } => EventKind::StreamTick,
            StreamEvent::TokensPurchased { .. } => EventKind::TokensPurchased,
        }
    }
}

type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Publish/subscribe bus with per-kind listener lists.
///
/// Notification order equals registration order. Listener panics are caught
/// and logged so one faulty consumer cannot starve the others.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for one event kind.
    ///
    /// Listeners for the same kind are invoked in the order they were
    /// registered.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Publishes an event to every listener registered for its kind.
    ///
    /// The listener list is snapshotted before dispatch so a listener may
    /// subscribe further listeners without deadlocking the bus. Listeners
    /// run synchronously on the publisher's task, possibly under the
    /// publisher's own state lock, and must not call back into the
    /// component that published.
    pub fn publish(&self, event: StreamEvent) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .get(&kind)
            .map(|listeners| listeners.to_vec())
            .unwrap_or_default();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(?kind, "event listener panicked, remaining listeners still run");
            }
        }
    }

    /// Number of listeners registered for a kind, for diagnostics.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listeners_notified_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(EventKind::StreamStopped, move |_| {
                order.lock().push(tag);
            });
        }

        bus.publish(StreamEvent::StreamStopped);

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_listener_does_not_starve_remaining() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe(EventKind::TokensPurchased, |_| {
            panic!("listener failure");
        });
        let reached_clone = Arc::clone(&reached);
        bus.subscribe(EventKind::TokensPurchased, move |_| {
            *reached_clone.lock() = true;
        });

        bus.publish(StreamEvent::TokensPurchased { amount: 100 });

        assert!(*reached.lock());
    }

    #[test]
    fn test_publish_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0usize));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe(EventKind::StreamStopped, move |_| {
            *hits_clone.lock() += 1;
        });

        bus.publish(StreamEvent::TokensPurchased { amount: 1 });
        assert_eq!(*hits.lock(), 0);

        bus.publish(StreamEvent::StreamStopped);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());

        let bus_clone = Arc::clone(&bus);
        bus.subscribe(EventKind::StreamStopped, move |_| {
            bus_clone.subscribe(EventKind::StreamStopped, |_| {});
        });

        bus.publish(StreamEvent::StreamStopped);

        assert_eq!(bus.listener_count(EventKind::StreamStopped), 2);
    }
}
