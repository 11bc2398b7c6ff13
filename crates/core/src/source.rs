use async_trait::async_trait;
use thiserror::Error;

use crate::domain::post::Post;
use crate::domain::profile::Profile;

pub const DEFAULT_POST_LIMIT: usize = 20;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("post source transport failure: {0}")]
    Transport(String),
    #[error("post source returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Read access to the monitored social network.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_profile(&self, target: &str) -> Result<Profile, SourceError>;

    /// Returns up to `limit` of the most recent posts, newest first.
    async fn fetch_posts(&self, target: &str, limit: usize) -> Result<Vec<Post>, SourceError>;
}
