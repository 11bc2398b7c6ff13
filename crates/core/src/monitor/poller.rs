use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AlertError, AlertSink, MonitorStore, PostAlert, StoreError, DEFAULT_POLL_INTERVAL_SECS};
use crate::domain::monitor::MonitorConfigId;
use crate::domain::post::{Post, PostId};
use crate::source::{PostSource, SourceError, DEFAULT_POST_LIMIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub fetch_limit: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_limit: DEFAULT_POST_LIMIT,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Checked {
        config_id: MonitorConfigId,
        fetched: usize,
        alerted: usize,
        cursor_advanced: bool,
    },
}

/// Keeps posts mentioning `keyword`, minus the one matching the cursor.
///
/// The cursor is an equality exclusion in fetch order, not an ordering
/// bound: only a post whose id equals `last_seen` is dropped.
pub fn select_new_posts(posts: Vec<Post>, keyword: &str, last_seen: Option<&PostId>) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|post| post.mentions(keyword))
        .filter(|post| last_seen != Some(&post.id))
        .collect()
}

pub struct MonitorPoller {
    store: Arc<dyn MonitorStore>,
    source: Arc<dyn PostSource>,
    sink: Arc<dyn AlertSink>,
    settings: PollerSettings,
}

impl MonitorPoller {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        source: Arc<dyn PostSource>,
        sink: Arc<dyn AlertSink>,
        settings: PollerSettings,
    ) -> Self {
        Self { store, source, sink, settings }
    }

    pub fn settings(&self) -> PollerSettings {
        self.settings
    }

    /// Runs a single tick. Alert delivery stops at the first failure and the
    /// cursor is left untouched, so the next tick retries the whole batch.
    pub async fn poll_once(&self) -> Result<PollOutcome, PollError> {
        let Some(config) = self.store.active_config().await? else {
            debug!(event_name = "monitor.poll.idle", "no active monitoring config");
            return Ok(PollOutcome::Idle);
        };

        let posts = self.source.fetch_posts(&config.target, self.settings.fetch_limit).await?;
        let fetched = posts.len();
        let fresh = select_new_posts(posts, &config.keyword, config.last_seen_post_id.as_ref());

        for post in &fresh {
            let alert = PostAlert {
                config_id: config.id,
                target: config.target.clone(),
                keyword: config.keyword.clone(),
                post: post.clone(),
            };
            self.sink.emit(&alert).await?;
        }

        let cursor_advanced = match fresh.first() {
            Some(first) => {
                let updated =
                    self.store.update_last_seen_for(config.id, &first.id, Utc::now()).await?;
                if !updated {
                    info!(
                        event_name = "monitor.poll.cursor_skipped",
                        config_id = %config.id,
                        post_id = %first.id,
                        "monitoring config changed during poll; cursor not advanced"
                    );
                }
                updated
            }
            None => false,
        };

        info!(
            event_name = "monitor.poll.checked",
            config_id = %config.id,
            username = %config.target,
            fetched,
            alerted = fresh.len(),
            cursor_advanced,
            "monitoring poll completed"
        );

        Ok(PollOutcome::Checked { config_id: config.id, fetched, alerted: fresh.len(), cursor_advanced })
    }

    /// Polls forever. Failures are logged and never end the loop.
    pub async fn run(&self) {
        info!(
            event_name = "monitor.loop.started",
            interval_secs = self.settings.interval.as_secs(),
            fetch_limit = self.settings.fetch_limit,
            "monitoring loop started"
        );

        loop {
            match self.poll_once().await {
                Ok(_) => {}
                Err(PollError::Store(store_error)) => {
                    error!(
                        event_name = "monitor.poll.storage_failed",
                        error = %store_error,
                        "monitoring poll hit a storage failure; continuing"
                    );
                }
                Err(poll_error) => {
                    warn!(
                        event_name = "monitor.poll.failed",
                        error = %poll_error,
                        "monitoring poll failed; continuing"
                    );
                }
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }
}

/// Owns the background poller. The loop is spawned at most once and lives
/// until process shutdown; stopping monitoring only flips the stored flag.
pub struct MonitorTask {
    poller: Arc<MonitorPoller>,
    handle: OnceLock<JoinHandle<()>>,
}

impl MonitorTask {
    pub fn new(poller: MonitorPoller) -> Self {
        Self { poller: Arc::new(poller), handle: OnceLock::new() }
    }

    /// Spawns the loop on first call. Returns `true` if this call started it.
    pub fn ensure_started(&self) -> bool {
        let mut started = false;
        self.handle.get_or_init(|| {
            started = true;
            let poller = Arc::clone(&self.poller);
            tokio::spawn(async move { poller.run().await })
        });
        started
    }

    pub fn is_started(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn poller(&self) -> &MonitorPoller {
        &self.poller
    }
}
