//! Metered payment channels.
//!
//! One channel is bound to one playing session and runs a periodic
//! settlement task for as long as it stays open. Settlement here is
//! simulated: each tick records a logged micropayment and publishes a
//! notification; no off-chain settlement protocol is involved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::events::{EventBus, StreamEvent};
use crate::task::PeriodicTask;

/// Channel lifecycle state. Closed is terminal; channel instances are never
/// reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closed,
}

struct ChannelShared {
    state: ChannelState,
    last_settlement: Option<DateTime<Utc>>,
}

/// A metered payment channel tied to one stream session.
///
/// `open` starts the settlement task; `close` cancels it synchronously and
/// is idempotent. Operations on an already-closed channel are absorbed as
/// no-ops.
pub struct MeteredPaymentChannel {
    channel_id: Uuid,
    content_id: String,
    opened_at: DateTime<Utc>,
    shared: Arc<Mutex<ChannelShared>>,
    events: Arc<EventBus>,
    settlement_task: Option<PeriodicTask>,
}

impl MeteredPaymentChannel {
    /// Opens a channel for `content_id` and starts its settlement task.
    ///
    /// Publishes [`StreamEvent::PaymentChannelOpened`]. Each settlement tick
    /// records a micropayment and publishes
    /// [`StreamEvent::PaymentProcessed`]; a tick that observes the channel
    /// already closed skips silently, which guards the race between the last
    /// scheduled tick and `close`.
    pub fn open(content_id: &str, config: &PaymentConfig, events: Arc<EventBus>) -> Self {
        let channel_id = Uuid::new_v4();
        let shared = Arc::new(Mutex::new(ChannelShared {
            state: ChannelState::Open,
            last_settlement: None,
        }));

        info!(%channel_id, content_id, "payment channel opened");
        events.publish(StreamEvent::PaymentChannelOpened {
            channel_id,
            content_id: content_id.to_string(),
        });

        let task_shared = Arc::clone(&shared);
        let task_events = Arc::clone(&events);
        let task_content_id = content_id.to_string();
        let price = config.purchase_price;
        let settlement_task = PeriodicTask::spawn(config.settlement_interval, move || {
            let timestamp = Utc::now();
            // The open-check and the notification stay atomic under the
            // state lock; a concurrent close() cannot interleave between
            // them on a multi-threaded runtime.
            let mut shared = task_shared.lock();
            if shared.state != ChannelState::Open {
                return;
            }
            shared.last_settlement = Some(timestamp);

            debug!(
                %channel_id,
                content_id = %task_content_id,
                amount = price,
                "settlement tick: micropayment recorded"
            );
            task_events.publish(StreamEvent::PaymentProcessed {
                channel_id,
                content_id: task_content_id.clone(),
                timestamp,
            });
        });

        Self {
            channel_id,
            content_id: content_id.to_string(),
            opened_at: Utc::now(),
            shared,
            events,
            settlement_task: Some(settlement_task),
        }
    }

    /// Closes the channel, cancelling the settlement task before returning.
    ///
    /// Idempotent: closing an already-closed channel has no observable
    /// effect and publishes no duplicate
    /// [`StreamEvent::PaymentChannelClosed`]. Acquiring the state lock here
    /// synchronizes with an in-flight settlement tick: once `close` returns,
    /// no further [`StreamEvent::PaymentProcessed`] is published.
    pub fn close(&mut self) {
        {
            let mut shared = self.shared.lock();
            if shared.state == ChannelState::Closed {
                debug!(channel_id = %self.channel_id, "close on closed channel ignored");
                return;
            }
            shared.state = ChannelState::Closed;
        }

        if let Some(mut task) = self.settlement_task.take() {
            task.cancel();
        }

        info!(channel_id = %self.channel_id, content_id = %self.content_id, "payment channel closed");
        self.events.publish(StreamEvent::PaymentChannelClosed {
            channel_id: self.channel_id,
        });
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn last_settlement(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().last_settlement
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().state == ChannelState::Open
    }
}

impl Drop for MeteredPaymentChannel {
    fn drop(&mut self) {
        // Discarding a session must not leave a settlement task running.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::EventKind;

    fn recording_bus(kind: EventKind) -> (Arc<EventBus>, Arc<Mutex<Vec<StreamEvent>>>) {
        let bus = Arc::new(EventBus::new());
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let recorded_clone = Arc::clone(&recorded);
        bus.subscribe(kind, move |event| {
            recorded_clone.lock().push(event.clone());
        });
        (bus, recorded)
    }

    fn test_payment_config() -> PaymentConfig {
        PaymentConfig {
            settlement_interval: Duration::from_millis(100),
            ..PaymentConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settlement_ticks_while_open() {
        let (bus, processed) = recording_bus(EventKind::PaymentProcessed);
        let channel = MeteredPaymentChannel::open("content_001", &test_payment_config(), bus);

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(processed.lock().len(), 3);
        assert!(channel.last_settlement().is_some());
        assert!(channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_settlement_after_close() {
        let (bus, processed) = recording_bus(EventKind::PaymentProcessed);
        let mut channel = MeteredPaymentChannel::open("content_001", &test_payment_config(), bus);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(processed.lock().len(), 3);

        // Close mid-interval
        channel.close();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(processed.lock().len(), 3);
        assert!(!channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (bus, closed) = recording_bus(EventKind::PaymentChannelClosed);
        let mut channel = MeteredPaymentChannel::open("content_001", &test_payment_config(), bus);

        channel.close();
        channel.close();
        channel.close();

        assert_eq!(closed.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_publishes_channel_opened() {
        let (bus, opened) = recording_bus(EventKind::PaymentChannelOpened);
        let channel = MeteredPaymentChannel::open("content_001", &test_payment_config(), bus);

        match opened.lock().first() {
            Some(StreamEvent::PaymentChannelOpened {
                channel_id,
                content_id,
            }) => {
                assert_eq!(*channel_id, channel.channel_id());
                assert_eq!(content_id, "content_001");
            }
            other => panic!("expected PaymentChannelOpened, got {other:?}"),
        }
    }

    fn teardown_recording_bus() -> (Arc<EventBus>, Arc<Mutex<Vec<StreamEvent>>>) {
        let bus = Arc::new(EventBus::new());
        let recorded = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::PaymentProcessed, EventKind::PaymentChannelClosed] {
            let recorded = Arc::clone(&recorded);
            bus.subscribe(kind, move |event| {
                recorded.lock().push(event.clone());
            });
        }
        (bus, recorded)
    }

    // Runs on a threaded runtime so a settlement tick can genuinely race
    // close(); the state lock makes the open-check and the notification
    // atomic, so PaymentChannelClosed must be the final event either way.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_settlement_published_after_close_on_threaded_runtime() {
        for _ in 0..25 {
            let (bus, recorded) = teardown_recording_bus();
            let config = PaymentConfig {
                settlement_interval: Duration::from_millis(1),
                ..PaymentConfig::default()
            };
            let mut channel = MeteredPaymentChannel::open("content_001", &config, bus);

            tokio::time::sleep(Duration::from_millis(3)).await;
            channel.close();
            tokio::time::sleep(Duration::from_millis(5)).await;

            let recorded = recorded.lock();
            let closed_at = recorded
                .iter()
                .position(|event| event.kind() == EventKind::PaymentChannelClosed)
                .expect("close publishes a PaymentChannelClosed");
            assert!(
                recorded[closed_at + 1..]
                    .iter()
                    .all(|event| event.kind() != EventKind::PaymentProcessed),
                "settlement recorded after channel close"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_channel() {
        let (bus, closed) = recording_bus(EventKind::PaymentChannelClosed);
        {
            let _channel =
                MeteredPaymentChannel::open("content_001", &test_payment_config(), bus);
        }

        assert_eq!(closed.lock().len(), 1);
    }
}
