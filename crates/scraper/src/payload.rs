use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use truthwatch_core::domain::post::{Post, PostId};
use truthwatch_core::domain::profile::Profile;
use truthwatch_core::source::SourceError;

/// The scraper actor refuses runs below this many posts.
pub const MIN_ACTOR_POSTS: usize = 5;

/// Run input for the Truth Social scraper actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperInput {
    pub identifiers: Vec<String>,
    pub fetch_posts: bool,
    pub clean_content: bool,
    pub only_media: bool,
    pub only_replies: bool,
    pub use_last_post_id: bool,
    pub max_posts: usize,
}

impl ScraperInput {
    pub fn profile(target: &str) -> Self {
        Self::new(target, false, MIN_ACTOR_POSTS)
    }

    pub fn posts(target: &str, limit: usize) -> Self {
        Self::new(target, true, limit)
    }

    fn new(target: &str, fetch_posts: bool, max_posts: usize) -> Self {
        Self {
            identifiers: vec![target.to_owned()],
            fetch_posts,
            clean_content: true,
            only_media: false,
            only_replies: false,
            use_last_post_id: false,
            max_posts: max_posts.max(MIN_ACTOR_POSTS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatasetItem {
    id: Option<Value>,
    content: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    favourites_count: u64,
    #[serde(default)]
    replies_count: u64,
    #[serde(default)]
    reblogs_count: u64,
    #[serde(default)]
    reblog: Option<Value>,
    account: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    username: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    statuses_count: u64,
    created_at: String,
    #[serde(default)]
    verified: bool,
}

fn decode_items(body: &str) -> Result<Vec<DatasetItem>, SourceError> {
    serde_json::from_str::<Vec<DatasetItem>>(body)
        .map_err(|error| SourceError::MalformedResponse(format!("dataset items: {error}")))
}

/// Reads the account of the first dataset item.
pub fn parse_profile(target: &str, body: &str) -> Result<Profile, SourceError> {
    let items = decode_items(body)?;
    let account = items
        .into_iter()
        .find_map(|item| item.account)
        .ok_or_else(|| SourceError::NotFound(target.to_owned()))?;
    profile_from_account(&account)
}

/// Reads posts in dataset order. Every post shares the author of the first
/// item; items without an id (account-only rows) are skipped.
pub fn parse_posts(target: &str, body: &str) -> Result<Vec<Post>, SourceError> {
    let items = decode_items(body)?;
    if items.is_empty() {
        return Err(SourceError::NotFound(target.to_owned()));
    }

    let author = items
        .iter()
        .find_map(|item| item.account.as_ref())
        .map(profile_from_account)
        .transpose()?
        .ok_or_else(|| SourceError::MalformedResponse("no item carries an account".to_owned()))?;

    items
        .into_iter()
        .filter_map(|mut item| item.id.take().map(|id| (id, item)))
        .map(|(id, item)| post_from_item(id, item, &author))
        .collect()
}

fn post_from_item(id: Value, item: DatasetItem, author: &Profile) -> Result<Post, SourceError> {
    let id = match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => {
            return Err(SourceError::MalformedResponse(format!("unexpected post id `{other}`")))
        }
    };
    let created_at = item
        .created_at
        .as_deref()
        .ok_or_else(|| SourceError::MalformedResponse(format!("post {id} has no created_at")))
        .and_then(|raw| parse_timestamp("post.created_at", raw))?;

    Ok(Post {
        id: PostId(id),
        author: author.clone(),
        content: item.content.unwrap_or_default(),
        created_at,
        likes_count: item.favourites_count,
        replies_count: item.replies_count,
        reposts_count: item.reblogs_count,
        is_repost: item.reblog.is_some_and(|value| !value.is_null()),
    })
}

fn profile_from_account(account: &RawAccount) -> Result<Profile, SourceError> {
    Ok(Profile {
        username: account.username.clone(),
        display_name: account.display_name.clone(),
        bio: account.note.as_deref().map(strip_paragraphs).filter(|bio| !bio.is_empty()),
        followers_count: account.followers_count,
        following_count: account.following_count,
        posts_count: account.statuses_count,
        created_at: parse_timestamp("account.created_at", &account.created_at)?,
        verified: account.verified,
    })
}

fn strip_paragraphs(note: &str) -> String {
    note.replace("<p>", "").replace("</p>", "").trim().to_owned()
}

/// Accepts RFC 3339 and offset-less ISO timestamps, the latter read as UTC.
fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, SourceError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|error| SourceError::MalformedResponse(format!("{field} `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use truthwatch_core::source::SourceError;

    use super::{parse_posts, parse_profile, ScraperInput};

    fn account() -> serde_json::Value {
        json!({
            "username": "realDonaldTrump",
            "display_name": "Donald J. Trump",
            "note": "<p>45th &amp; 47th President</p>",
            "followers_count": 9000000,
            "following_count": 70,
            "statuses_count": 25000,
            "created_at": "2022-02-11T16:16:10.000Z",
            "verified": true
        })
    }

    #[test]
    fn input_serializes_actor_schema_with_minimum_posts() {
        let input = serde_json::to_value(ScraperInput::posts("someone", 2)).expect("serialize");
        assert_eq!(
            input,
            json!({
                "identifiers": ["someone"],
                "fetchPosts": true,
                "cleanContent": true,
                "onlyMedia": false,
                "onlyReplies": false,
                "useLastPostId": false,
                "maxPosts": 5
            })
        );
        assert!(!ScraperInput::profile("someone").fetch_posts);
    }

    #[test]
    fn profile_strips_paragraph_tags_from_bio() {
        let body = json!([{ "account": account() }]).to_string();
        let profile = parse_profile("realDonaldTrump", &body).expect("profile");

        assert_eq!(profile.username, "realDonaldTrump");
        assert_eq!(profile.bio.as_deref(), Some("45th &amp; 47th President"));
        assert_eq!(profile.posts_count, 25000);
        assert!(profile.verified);
        assert_eq!(
            profile.created_at,
            Utc.with_ymd_and_hms(2022, 2, 11, 16, 16, 10).single().expect("timestamp")
        );
    }

    #[test]
    fn empty_dataset_means_unknown_account() {
        assert_eq!(
            parse_profile("ghost", "[]"),
            Err(SourceError::NotFound("ghost".to_owned()))
        );
        assert_eq!(parse_posts("ghost", "[]"), Err(SourceError::NotFound("ghost".to_owned())));
    }

    #[test]
    fn posts_keep_dataset_order_and_flag_reposts() {
        let body = json!([
            {
                "id": "113",
                "content": "newest",
                "created_at": "2025-02-01T10:00:00.000Z",
                "favourites_count": 10,
                "replies_count": 2,
                "reblogs_count": 3,
                "reblog": null,
                "account": account()
            },
            {
                "id": 112,
                "content": "older repost",
                "created_at": "2025-01-31T10:00:00",
                "reblog": { "id": "99" },
                "account": account()
            }
        ])
        .to_string();

        let posts = parse_posts("realDonaldTrump", &body).expect("posts");
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id.as_str(), "113");
        assert_eq!(posts[0].likes_count, 10);
        assert!(!posts[0].is_repost);
        assert_eq!(posts[1].id.as_str(), "112");
        assert!(posts[1].is_repost);
        assert_eq!(posts[1].author.username, "realDonaldTrump");
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(
            parse_posts("someone", "{\"error\":\"nope\"}"),
            Err(SourceError::MalformedResponse(_))
        ));
        let missing_date = json!([{ "id": "1", "content": "x", "account": account() }]).to_string();
        assert!(matches!(
            parse_posts("someone", &missing_date),
            Err(SourceError::MalformedResponse(_))
        ));
    }
}
