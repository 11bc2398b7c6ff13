use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::post::PostId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonitorConfigId(pub i64);

impl std::fmt::Display for MonitorConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub id: MonitorConfigId,
    pub target: String,
    pub keyword: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_seen_post_id: Option<PostId>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}
