use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use truthwatch_core::domain::monitor::{MonitorConfigId, MonitoringConfig};
use truthwatch_core::domain::post::PostId;
use truthwatch_core::monitor::{AddOutcome, MonitorStore, StoreError};

#[derive(Default)]
struct MonitorRows {
    next_id: i64,
    rows: Vec<MonitoringConfig>,
}

impl MonitorRows {
    fn active_mut(&mut self) -> Option<&mut MonitoringConfig> {
        self.rows.iter_mut().rev().find(|row| row.active)
    }

    fn push_active(&mut self, target: &str, keyword: &str) -> MonitorConfigId {
        self.next_id += 1;
        let id = MonitorConfigId(self.next_id);
        self.rows.push(MonitoringConfig {
            id,
            target: target.to_owned(),
            keyword: keyword.to_owned(),
            last_checked_at: None,
            last_seen_post_id: None,
            created_at: Utc::now(),
            active: true,
        });
        id
    }
}

/// Same contract as the SQL repository, held in process memory. Every
/// mutation takes the write lock, which makes each operation atomic.
#[derive(Default)]
pub struct InMemoryMonitorRepository {
    state: RwLock<MonitorRows>,
}

impl InMemoryMonitorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn all(&self) -> Vec<MonitoringConfig> {
        self.state.read().await.rows.clone()
    }
}

#[async_trait::async_trait]
impl MonitorStore for InMemoryMonitorRepository {
    async fn add_config(&self, target: &str, keyword: &str) -> Result<MonitorConfigId, StoreError> {
        let mut state = self.state.write().await;
        for row in state.rows.iter_mut() {
            row.active = false;
        }
        Ok(state.push_active(target, keyword))
    }

    async fn add_config_if_idle(
        &self,
        target: &str,
        keyword: &str,
    ) -> Result<AddOutcome, StoreError> {
        let mut state = self.state.write().await;
        if let Some(active) = state.active_mut() {
            return Ok(AddOutcome::AlreadyActive(active.clone()));
        }
        Ok(AddOutcome::Added(state.push_active(target, keyword)))
    }

    async fn active_config(&self) -> Result<Option<MonitoringConfig>, StoreError> {
        let state = self.state.read().await;
        Ok(state.rows.iter().rev().find(|row| row.active).cloned())
    }

    async fn update_last_seen(
        &self,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(row) = state.active_mut() else {
            return Ok(false);
        };
        row.last_seen_post_id = Some(post_id.clone());
        row.last_checked_at = Some(checked_at);
        Ok(true)
    }

    async fn update_last_seen_for(
        &self,
        id: MonitorConfigId,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.active_mut() {
            Some(row) if row.id == id => {
                row.last_seen_post_id = Some(post_id.clone());
                row.last_checked_at = Some(checked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate(&self) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let mut changed = false;
        for row in state.rows.iter_mut().filter(|row| row.active) {
            row.active = false;
            changed = true;
        }
        Ok(changed)
    }
}
