use chrono::{DateTime, Utc};

use crate::domain::post::{contains_ignore_case, Post};

pub const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterOutcome {
    pub posts: Vec<Post>,
    /// Number of posts that passed the date and keyword filters, before capping.
    pub matched: usize,
    pub truncated: bool,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Splits a comma-separated keyword list, dropping blank entries.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

/// Applies the date cutoff, keyword match and result cap, in that order.
///
/// Input order is preserved, so a newest-first source yields the newest
/// matches when capped.
pub fn filter_posts(
    posts: Vec<Post>,
    since: DateTime<Utc>,
    keywords: Option<&str>,
    max_results: Option<usize>,
) -> FilterOutcome {
    let keywords = keywords.map(parse_keywords).unwrap_or_default();

    let mut retained = posts
        .into_iter()
        .filter(|post| post.created_at >= since)
        .filter(|post| {
            keywords.is_empty()
                || keywords.iter().any(|keyword| contains_ignore_case(&post.content, keyword))
        })
        .collect::<Vec<_>>();

    let matched = retained.len();
    let truncated = match max_results {
        Some(limit) if matched > limit => {
            retained.truncate(limit);
            true
        }
        _ => false,
    };

    FilterOutcome { posts: retained, matched, truncated }
}
