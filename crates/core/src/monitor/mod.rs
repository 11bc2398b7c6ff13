//! Keyword monitoring: the persisted single-active configuration and the
//! background poller that turns new matching posts into alerts.

mod poller;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::monitor::{MonitorConfigId, MonitoringConfig};
use crate::domain::post::{Post, PostId};

pub use poller::{select_new_posts, MonitorPoller, MonitorTask, PollError, PollOutcome, PollerSettings};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Result of [`MonitorStore::add_config_if_idle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added(MonitorConfigId),
    AlreadyActive(MonitoringConfig),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("monitor storage failure: {0}")]
    Storage(String),
}

/// Persisted monitoring configuration with at most one active row.
///
/// Every method is atomic with respect to the others. `add_config`
/// deactivates the previous row and inserts the new one as a single step, so
/// readers never observe zero or two active rows across the call.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn add_config(&self, target: &str, keyword: &str)
        -> Result<MonitorConfigId, StoreError>;

    /// Inserts a new active row only when no row is active; otherwise the
    /// active row is returned untouched.
    ///
    /// The provided body checks and inserts as two calls. Implementations
    /// that can hold their write lock across both override it.
    async fn add_config_if_idle(
        &self,
        target: &str,
        keyword: &str,
    ) -> Result<AddOutcome, StoreError> {
        if let Some(active) = self.active_config().await? {
            return Ok(AddOutcome::AlreadyActive(active));
        }
        Ok(AddOutcome::Added(self.add_config(target, keyword).await?))
    }

    async fn active_config(&self) -> Result<Option<MonitoringConfig>, StoreError>;

    async fn is_active(&self) -> Result<bool, StoreError> {
        Ok(self.active_config().await?.is_some())
    }

    /// Advances the cursor of whichever row is active. Returns `false` when
    /// nothing is active.
    async fn update_last_seen(
        &self,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Advances the cursor only if `id` is still the active row.
    async fn update_last_seen_for(
        &self,
        id: MonitorConfigId,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when there was no active row to deactivate.
    async fn deactivate(&self) -> Result<bool, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostAlert {
    pub config_id: MonitorConfigId,
    pub target: String,
    pub keyword: String,
    pub post: Post,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Receives one call per newly discovered matching post.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &PostAlert) -> Result<(), AlertError>;
}
