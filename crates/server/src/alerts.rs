use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use truthwatch_core::monitor::{AlertError, AlertSink, PostAlert};
use truthwatch_discord::embeds::alert_message;
use truthwatch_discord::rest::ChannelMessenger;

/// Alert destinations: configured channels first, then channels where
/// monitoring was started at runtime.
#[derive(Debug, Default)]
pub struct AlertChannels {
    configured: Vec<String>,
    registered: RwLock<Vec<String>>,
}

impl AlertChannels {
    pub fn new(configured: Vec<String>) -> Self {
        Self { configured, registered: RwLock::new(Vec::new()) }
    }

    /// Returns `true` when the channel was not already known.
    pub fn register(&self, channel_id: &str) -> bool {
        if self.configured.iter().any(|known| known == channel_id) {
            return false;
        }
        let mut registered = self.registered.write().unwrap_or_else(PoisonError::into_inner);
        if registered.iter().any(|known| known == channel_id) {
            return false;
        }
        registered.push(channel_id.to_owned());
        true
    }

    pub fn channels(&self) -> Vec<String> {
        let registered = self.registered.read().unwrap_or_else(PoisonError::into_inner);
        self.configured.iter().chain(registered.iter()).cloned().collect()
    }
}

pub struct ChannelAlertSink {
    channels: Arc<AlertChannels>,
    messenger: Arc<dyn ChannelMessenger>,
}

impl ChannelAlertSink {
    pub fn new(channels: Arc<AlertChannels>, messenger: Arc<dyn ChannelMessenger>) -> Self {
        Self { channels, messenger }
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    /// Succeeds if at least one channel accepted the alert. With no channel
    /// known yet the alert fails, so the poller keeps the cursor in place.
    async fn emit(&self, alert: &PostAlert) -> Result<(), AlertError> {
        let channels = self.channels.channels();
        if channels.is_empty() {
            return Err(AlertError::Delivery("no alert channel is known yet".to_owned()));
        }

        let message = alert_message(alert);
        let mut delivered = 0_usize;
        let mut last_error = None;
        for channel_id in &channels {
            match self.messenger.send(channel_id, &message).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(
                        event_name = "monitor.alert.channel_failed",
                        channel_id = %channel_id,
                        post_id = %alert.post.id,
                        error = %error,
                        "alert delivery to channel failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        if delivered == 0 {
            let detail = last_error.map(|error| error.to_string()).unwrap_or_default();
            return Err(AlertError::Delivery(detail));
        }
        info!(
            event_name = "monitor.alert.delivered",
            config_id = alert.config_id.0,
            post_id = %alert.post.id,
            channels = delivered,
            "alert delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use truthwatch_discord::embeds::MessageTemplate;
    use truthwatch_discord::rest::{ChannelMessenger, MessengerError};

    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<(String, MessageTemplate)>>,
        pub failing_channels: Vec<String>,
    }

    #[async_trait]
    impl ChannelMessenger for RecordingMessenger {
        async fn send(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), MessengerError> {
            if self.failing_channels.iter().any(|failing| failing == channel_id) {
                return Err(MessengerError::Rejected { status: 403, detail: "Missing Access".to_owned() });
            }
            self.sent.lock().await.push((channel_id.to_owned(), message.clone()));
            Ok(())
        }
    }
}
