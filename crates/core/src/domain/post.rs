use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::profile::Profile;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: Profile,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub likes_count: u64,
    pub replies_count: u64,
    pub reposts_count: u64,
    pub is_repost: bool,
}

impl Post {
    pub fn url(&self) -> String {
        format!("https://truthsocial.com/@{}/{}", self.author.username, self.id)
    }

    /// Case-insensitive substring match against the post body.
    pub fn mentions(&self, keyword: &str) -> bool {
        contains_ignore_case(&self.content, keyword)
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
