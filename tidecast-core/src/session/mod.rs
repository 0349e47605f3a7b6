//! Stream session orchestration.
//!
//! A [`StreamSession`] drives one playback attempt end to end: metadata
//! resolution, the entitlement/purchase flow, gateway failover resolution,
//! payment channel lifecycle, and the viewing-time tick task. Consumers
//! observe progress through the [`EventBus`] rather than holding references
//! into the session.

pub mod metadata;


use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use metadata::{
    ContentDescriptor, HttpMetadataSource, MetadataError, MetadataSource, StaticMetadataSource,
};

use crate::access::{AccessController, AccessError, PaymentContract};
use crate::config::TidecastConfig;
use crate::events::{EventBus, StreamEvent};
use crate::gateway::GatewayResolver;
use crate::payment::MeteredPaymentChannel;
use crate::task::PeriodicTask;

/// Session lifecycle status.
///
/// Transitions are monotonic along idle → resolving → {playing | errored} →
/// stopped. Re-entrant stop calls are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Resolving,
    Playing,
    Stopped,
    Errored,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Resolving => write!(f, "resolving"),
            SessionStatus::Playing => write!(f, "playing"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Errored => write!(f, "errored"),
        }
    }
}

/// Errors surfaced by `start_stream`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Sessions are single-use: one playback attempt per instance.
    #[error("Cannot start stream from status {status}")]
    AlreadyActive { status: SessionStatus },

    /// The descriptor offers neither a matching quality nor a raw locator.
    #[error("No playable source for {content_id}")]
    NoPlayableSource { content_id: String },
}

struct SessionShared {
    status: SessionStatus,
    content_id: Option<String>,
    gateway: Option<String>,
    quality: Option<String>,
    fallback: bool,
    tick_count: u64,
    stop_requested: bool,
}

/// Handle that can request a stop while `start_stream` is still resolving.
///
/// A stop observed at any suspension point wins: the late resolution result
/// is dropped instead of opening a channel or starting tick tasks.
#[derive(Clone)]
pub struct SessionStopHandle {
    shared: Arc<Mutex<SessionShared>>,
}

impl SessionStopHandle {
    pub fn request_stop(&self) {
        self.shared.lock().stop_requested = true;
    }
}

/// Orchestrates one playback attempt.
///
/// Owns at most one open payment channel and at most one viewing-tick task
/// at any time; `stop_stream` cancels both together, exactly once.
pub struct StreamSession {
    config: TidecastConfig,
    subject: String,
    resolver: Arc<GatewayResolver>,
    access: AccessController,
    metadata: Arc<dyn MetadataSource>,
    events: Arc<EventBus>,
    shared: Arc<Mutex<SessionShared>>,
    tick_task: Option<PeriodicTask>,
    channel: Option<MeteredPaymentChannel>,
}

impl StreamSession {
    pub fn new(
        config: TidecastConfig,
        subject: impl Into<String>,
        resolver: Arc<GatewayResolver>,
        contract: Arc<dyn PaymentContract>,
        metadata: Arc<dyn MetadataSource>,
        events: Arc<EventBus>,
    ) -> Self {
        let access = AccessController::new(
            contract,
            Arc::clone(&events),
            config.payment.clone(),
        );

        Self {
            config,
            subject: subject.into(),
            resolver,
            access,
            metadata,
            events,
            shared: Arc::new(Mutex::new(SessionShared {
                status: SessionStatus::Idle,
                content_id: None,
                gateway: None,
                quality: None,
                fallback: false,
                tick_count: 0,
                stop_requested: false,
            })),
            tick_task: None,
            channel: None,
        }
    }

    /// Starts playback of `content_id`.
    ///
    /// Resolves metadata (synthesizing defaults when the source is
    /// unavailable), establishes access, selects a quality variant, resolves
    /// a gateway, then opens the payment channel and starts the viewing-tick
    /// task. Access resolution strictly precedes gateway probing; gateway
    /// resolution strictly precedes channel opening.
    ///
    /// Total gateway exhaustion degrades to the configured local fallback
    /// source without a payment channel and still publishes
    /// [`StreamEvent::StreamStarted`] tagged as fallback.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyActive` - The session already ran
    /// - `SessionError::Access` - Entitlement missing and the purchase flow
    ///   failed; no gateway probe was issued
    /// - `SessionError::NoPlayableSource` - Descriptor has no usable locator
    pub async fn start_stream(
        &mut self,
        content_id: &str,
        requested_quality: Option<&str>,
    ) -> Result<(), SessionError> {
        {
            let mut shared = self.shared.lock();
            if shared.status != SessionStatus::Idle {
                return Err(SessionError::AlreadyActive {
                    status: shared.status,
                });
            }
            shared.status = SessionStatus::Resolving;
            shared.content_id = Some(content_id.to_string());
        }
        info!(content_id, subject = %self.subject, "starting stream");

        let descriptor = match self.metadata.fetch(content_id).await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!(content_id, %error, "metadata unavailable, synthesizing defaults");
                ContentDescriptor::synthesized(content_id)
            }
        };
        if self.finish_if_stop_requested() {
            return Ok(());
        }

        if let Err(error) = self.access.ensure_access(content_id, &self.subject).await {
            return Err(self.fail_attempt(content_id, error.into()));
        }
        if self.finish_if_stop_requested() {
            return Ok(());
        }

        let (quality, locator) = match select_source(
            &descriptor,
            requested_quality,
            &self.config.session.default_quality,
        ) {
            Ok(selected) => selected,
            Err(error) => return Err(self.fail_attempt(content_id, error)),
        };
        debug!(content_id, %quality, %locator, "quality variant selected");

        match self.resolver.resolve(&locator, &quality).await {
            Ok(resolved) => {
                if self.finish_if_stop_requested() {
                    return Ok(());
                }
                self.begin_playback(content_id, &descriptor, resolved.gateway, quality);
            }
            // Per-gateway failures never escape resolve; only exhaustion
            // reaches here, and it degrades rather than fails.
            Err(error) => {
                if self.finish_if_stop_requested() {
                    return Ok(());
                }
                debug!(%error, "gateway resolution exhausted");
                self.begin_fallback_playback(content_id, &descriptor, quality);
            }
        }

        Ok(())
    }

    /// Stops the session.
    ///
    /// Idempotent: cancels the tick task, closes the payment channel if one
    /// exists, and publishes [`StreamEvent::StreamStopped`] exactly once no
    /// matter how many times it is called.
    pub fn stop_stream(&mut self) {
        {
            let mut shared = self.shared.lock();
            shared.stop_requested = true;
            if shared.status == SessionStatus::Stopped {
                debug!("stop on stopped session ignored");
                return;
            }
            shared.status = SessionStatus::Stopped;
        }

        if let Some(mut task) = self.tick_task.take() {
            task.cancel();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }

        info!(subject = %self.subject, "stream stopped");
        self.events.publish(StreamEvent::StreamStopped);
    }

    /// Returns a handle that can request a stop from another task while
    /// resolution is in flight.
    pub fn stop_handle(&self) -> SessionStopHandle {
        SessionStopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock().status
    }

    pub fn content_id(&self) -> Option<String> {
        self.shared.lock().content_id.clone()
    }

    /// Whether playback is running against the local fallback source.
    pub fn is_fallback(&self) -> bool {
        self.shared.lock().fallback
    }

    pub fn selected_gateway(&self) -> Option<String> {
        self.shared.lock().gateway.clone()
    }

    pub fn selected_quality(&self) -> Option<String> {
        self.shared.lock().quality.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.lock().tick_count
    }

    pub fn channel_id(&self) -> Option<Uuid> {
        self.channel.as_ref().map(|channel| channel.channel_id())
    }

    fn begin_playback(
        &mut self,
        content_id: &str,
        descriptor: &ContentDescriptor,
        gateway: String,
        quality: String,
    ) {
        let channel = MeteredPaymentChannel::open(
            content_id,
            &self.config.payment,
            Arc::clone(&self.events),
        );
        let channel_id = channel.channel_id();

        {
            let mut shared = self.shared.lock();
            shared.status = SessionStatus::Playing;
            shared.gateway = Some(gateway.clone());
            shared.quality = Some(quality);
            shared.fallback = false;
        }

        self.tick_task = Some(self.spawn_tick_task(content_id, channel_id));
        self.channel = Some(channel);

        info!(content_id, %gateway, "stream playing");
        self.events.publish(StreamEvent::StreamStarted {
            content_id: content_id.to_string(),
            gateway,
            metadata: descriptor.clone(),
            fallback: false,
        });
    }

    /// Degraded playing sub-state: local source, no payment channel, no
    /// viewing ticks. Availability wins over strict metering.
    fn begin_fallback_playback(
        &mut self,
        content_id: &str,
        descriptor: &ContentDescriptor,
        quality: String,
    ) {
        let gateway = self.config.gateway.local_fallback.clone();

        {
            let mut shared = self.shared.lock();
            shared.status = SessionStatus::Playing;
            shared.gateway = Some(gateway.clone());
            shared.quality = Some(quality);
            shared.fallback = true;
        }

        warn!(content_id, %gateway, "all gateways exhausted, playing from local fallback");
        self.events.publish(StreamEvent::StreamStarted {
            content_id: content_id.to_string(),
            gateway,
            metadata: descriptor.clone(),
            fallback: true,
        });
    }

    fn spawn_tick_task(&self, content_id: &str, channel_id: Uuid) -> PeriodicTask {
        let shared = Arc::clone(&self.shared);
        let events = Arc::clone(&self.events);
        let content_id = content_id.to_string();
        let interval = self.config.session.tick_interval;
        let interval_millis = interval.as_millis() as u64;

        PeriodicTask::spawn(interval, move || {
            // The playing-check and the notification stay atomic under the
            // state lock; a concurrent stop cannot interleave between them.
            let mut shared = shared.lock();
            if shared.status != SessionStatus::Playing {
                return;
            }
            shared.tick_count += 1;

            events.publish(StreamEvent::StreamTick {
                content_id: content_id.clone(),
                tick_count: shared.tick_count,
                seconds: shared.tick_count * interval_millis / 1000,
                channel_id,
            });
        })
    }

    fn fail_attempt(&self, content_id: &str, error: SessionError) -> SessionError {
        self.shared.lock().status = SessionStatus::Errored;
        warn!(content_id, %error, "stream attempt failed");
        self.events.publish(StreamEvent::StreamError {
            content_id: content_id.to_string(),
            error: error.to_string(),
        });
        error
    }

    fn finish_if_stop_requested(&mut self) -> bool {
        let stopping = {
            let mut shared = self.shared.lock();
            if shared.stop_requested && shared.status != SessionStatus::Stopped {
                shared.status = SessionStatus::Stopped;
                true
            } else {
                false
            }
        };

        if stopping {
            debug!("stop requested mid-resolution, dropping late result");
            self.events.publish(StreamEvent::StreamStopped);
        }
        stopping
    }
}

/// Selects the quality variant and source locator for a descriptor.
///
/// Priority order: explicitly requested quality if the descriptor supports
/// it, then the session default quality, then the raw/default locator.
fn select_source(
    descriptor: &ContentDescriptor,
    requested: Option<&str>,
    default_quality: &str,
) -> Result<(String, String), SessionError> {
    if let Some(quality) = requested {
        if let Some(locator) = descriptor.sources.get(quality) {
            return Ok((quality.to_string(), locator.clone()));
        }
    }

    if let Some(locator) = descriptor.sources.get(default_quality) {
        return Ok((default_quality.to_string(), locator.clone()));
    }

    if let Some(locator) = &descriptor.default_source {
        return Ok(("default".to_string(), locator.clone()));
    }

    Err(SessionError::NoPlayableSource {
        content_id: descriptor.content_id.clone(),
    })
}
