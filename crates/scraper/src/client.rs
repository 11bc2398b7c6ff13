use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, warn};

use truthwatch_core::config::ScraperConfig;
use truthwatch_core::domain::post::Post;
use truthwatch_core::domain::profile::{normalize_target, Profile};
use truthwatch_core::source::{PostSource, SourceError};

use crate::payload::{parse_posts, parse_profile, ScraperInput};

#[derive(Clone, Debug)]
pub struct ApifySettings {
    pub api_token: SecretString,
    pub actor_id: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Upper bound applied to every post fetch.
    pub max_posts: usize,
}

impl From<&ScraperConfig> for ApifySettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            api_token: config.api_token.clone(),
            actor_id: config.actor_id.clone(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_posts: config.max_posts,
        }
    }
}

/// Runs the scraper actor synchronously and reads its dataset items in the
/// same response.
pub struct ApifyClient {
    client: Client,
    settings: ApifySettings,
}

impl ApifyClient {
    pub fn new(settings: ApifySettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| SourceError::Transport(format!("http client setup: {error}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ApifySettings {
        &self.settings
    }

    /// `acts/{owner}~{name}/run-sync-get-dataset-items` under the base URL.
    pub fn run_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        let actor = self.settings.actor_id.replace('/', "~");
        format!("{base}/acts/{actor}/run-sync-get-dataset-items")
    }

    async fn run_actor(&self, input: &ScraperInput) -> Result<String, SourceError> {
        debug!(
            event_name = "scraper.apify.run_started",
            actor_id = %self.settings.actor_id,
            identifiers = ?input.identifiers,
            fetch_posts = input.fetch_posts,
            max_posts = input.max_posts,
            "running scraper actor"
        );

        let response = self
            .client
            .post(self.run_url())
            .header("Authorization", format!("Bearer {}", self.settings.api_token.expose_secret()))
            .json(input)
            .send()
            .await
            .map_err(|error| {
                error!(event_name = "scraper.apify.request_failed", error = %error, "scraper request failed");
                SourceError::Transport(transport_message(&error))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "scraper.apify.bad_status",
                status = %status,
                "scraper actor returned an error status"
            );
            return Err(status_error(status, &detail));
        }

        response
            .text()
            .await
            .map_err(|error| SourceError::Transport(format!("reading dataset items: {error}")))
    }
}

#[async_trait]
impl PostSource for ApifyClient {
    async fn fetch_profile(&self, target: &str) -> Result<Profile, SourceError> {
        let target = normalize_target(target);
        let body = self.run_actor(&ScraperInput::profile(&target)).await?;
        parse_profile(&target, &body)
    }

    async fn fetch_posts(&self, target: &str, limit: usize) -> Result<Vec<Post>, SourceError> {
        let target = normalize_target(target);
        let limit = limit.min(self.settings.max_posts);
        let body = self.run_actor(&ScraperInput::posts(&target, limit)).await?;
        let mut posts = parse_posts(&target, &body)?;
        posts.truncate(limit);

        debug!(
            event_name = "scraper.apify.posts_fetched",
            username = %target,
            count = posts.len(),
            "scraper returned posts"
        );
        Ok(posts)
    }
}

fn transport_message(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "scraper request timed out".to_string()
    } else if error.is_connect() {
        "could not reach the scraper API".to_string()
    } else {
        format!("scraper request failed: {error}")
    }
}

fn status_error(status: StatusCode, detail: &str) -> SourceError {
    let detail = detail.chars().take(200).collect::<String>();
    match status {
        StatusCode::BAD_REQUEST => {
            SourceError::MalformedResponse(format!("scraper rejected the run input: {detail}"))
        }
        _ => SourceError::Transport(format!("scraper API returned {status}: {detail}")),
    }
}
