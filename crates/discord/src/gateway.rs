use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::embeds::MessageTemplate;
use crate::events::{
    DispatchError, EventContext, EventDispatcher, GatewayEnvelope, HandlerResult,
};
use crate::rest::ChannelMessenger;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Heartbeat round trip as last measured by the transport.
#[derive(Clone, Debug, Default)]
pub struct GatewayLatency {
    millis: Arc<AtomicU64>,
}

impl GatewayLatency {
    pub fn record(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.millis.store(millis, Ordering::Relaxed);
    }

    pub fn millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}

/// `resume_from` carries the last sequence number seen, so a transport can
/// resume instead of re-identifying.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, resume_from: Option<u64>) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self, _resume_from: Option<u64>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    messenger: Arc<dyn ChannelMessenger>,
    reconnect_policy: ReconnectPolicy,
    last_sequence: AtomicU64,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        messenger: Arc<dyn ChannelMessenger>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, messenger, reconnect_policy, last_sequence: AtomicU64::new(0) }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "discord gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    fn resume_point(&self) -> Option<u64> {
        match self.last_sequence.load(Ordering::Relaxed) {
            0 => None,
            sequence => Some(sequence),
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        let resume_from = self.resume_point();
        info!(attempt, resume_from, "opening discord gateway connection");
        self.transport.connect(resume_from).await?;
        info!(attempt, "discord gateway connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "discord gateway stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            if let Some(sequence) = envelope.sequence {
                self.last_sequence.fetch_max(sequence, Ordering::Relaxed);
            }

            let correlation_id = correlation_id(&envelope);
            info!(
                event_name = "ingress.discord.event_received",
                sequence = envelope.sequence,
                event_type = ?envelope.event.event_type(),
                correlation_id = %correlation_id,
                "received discord event"
            );

            let context = EventContext { correlation_id };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded { channel_id, message }) => {
                    self.deliver(&channel_id, &message, &context).await;
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(DispatchError::Handler(error)) => {
                    warn!(
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event dispatch failed; continuing gateway loop"
                    );
                    if let Some((channel_id, reply)) = error.reply() {
                        self.deliver(channel_id, &reply, &context).await;
                    }
                }
            }
        }
    }

    async fn deliver(&self, channel_id: &str, message: &MessageTemplate, context: &EventContext) {
        if let Err(error) = self.messenger.send(channel_id, message).await {
            warn!(
                event_name = "egress.discord.reply_failed",
                correlation_id = %context.correlation_id,
                channel_id,
                error = %error,
                "failed to send reply"
            );
        }
    }
}

fn correlation_id(envelope: &GatewayEnvelope) -> String {
    match &envelope.event {
        crate::events::GatewayEvent::MessageCreate(payload) => payload.message_id.clone(),
        _ => envelope
            .sequence
            .map(|sequence| format!("seq-{sequence}"))
            .unwrap_or_else(|| "unknown-correlation-id".to_owned()),
    }
}
