use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
}

impl Profile {
    pub fn url(&self) -> String {
        format!("https://truthsocial.com/@{}", self.username)
    }
}

/// Strips a leading `@` and surrounding whitespace from a user supplied handle.
pub fn normalize_target(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_owned()
}
