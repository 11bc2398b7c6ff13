use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::embeds::MessageTemplate;

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
/// Longer rate-limit waits are reported instead of slept through.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MessengerError {
    #[error("discord request failed: {0}")]
    Transport(String),
    #[error("discord rejected the message with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("discord rate limit hit; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

#[async_trait]
pub trait ChannelMessenger: Send + Sync {
    async fn send(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), MessengerError>;
}

#[derive(Clone, Debug)]
pub struct RestSettings {
    pub bot_token: SecretString,
    pub api_base: String,
    pub timeout: Duration,
}

impl RestSettings {
    pub fn new(bot_token: SecretString) -> Self {
        Self { bot_token, api_base: DISCORD_API_BASE.to_owned(), timeout: Duration::from_secs(15) }
    }
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Posts messages through the channel messages endpoint.
pub struct DiscordRestClient {
    client: Client,
    settings: RestSettings,
}

impl DiscordRestClient {
    pub fn new(settings: RestSettings) -> Result<Self, MessengerError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| MessengerError::Transport(format!("http client setup: {error}")))?;
        Ok(Self { client, settings })
    }

    pub fn message_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.settings.api_base.trim_end_matches('/'))
    }

    async fn post_once(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), MessengerError> {
        let response = self
            .client
            .post(self.message_url(channel_id))
            .header("Authorization", format!("Bot {}", self.settings.bot_token.expose_secret()))
            .json(message)
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "egress.discord.request_failed",
                    channel_id,
                    error = %error,
                    "discord message request failed"
                );
                MessengerError::Transport(error.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = serde_json::from_str::<RateLimitBody>(&body)
                .ok()
                .filter(|limit| limit.retry_after.is_finite() && limit.retry_after >= 0.0)
                .map(|limit| Duration::from_secs_f64(limit.retry_after))
                .unwrap_or(Duration::from_secs(1));
            return Err(MessengerError::RateLimited { retry_after });
        }
        Err(MessengerError::Rejected {
            status: status.as_u16(),
            detail: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl ChannelMessenger for DiscordRestClient {
    async fn send(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), MessengerError> {
        match self.post_once(channel_id, message).await {
            Err(MessengerError::RateLimited { retry_after }) if retry_after <= MAX_RATE_LIMIT_WAIT => {
                warn!(
                    event_name = "egress.discord.rate_limited",
                    channel_id,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "rate limited; retrying once"
                );
                tokio::time::sleep(retry_after).await;
                self.post_once(channel_id, message).await
            }
            result => {
                if result.is_ok() {
                    debug!(event_name = "egress.discord.message_sent", channel_id, "message sent");
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DiscordRestClient, RestSettings};

    #[test]
    fn message_url_targets_channel_messages() {
        let client = DiscordRestClient::new(RestSettings::new("token".to_owned().into())).expect("client");
        assert_eq!(
            client.message_url("123"),
            "https://discord.com/api/v10/channels/123/messages"
        );

        let local = DiscordRestClient::new(RestSettings {
            bot_token: "token".to_owned().into(),
            api_base: "http://127.0.0.1:1/api/".to_owned(),
            timeout: Duration::from_secs(1),
        })
        .expect("client");
        assert_eq!(local.message_url("9"), "http://127.0.0.1:1/api/channels/9/messages");
    }

    #[test]
    fn settings_debug_hides_token() {
        let settings = RestSettings::new("super-secret-token".to_owned().into());
        assert!(!format!("{settings:?}").contains("super-secret-token"));
    }
}
