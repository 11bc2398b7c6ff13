use chrono::{DateTime, Utc};
use serde::Serialize;

use truthwatch_core::domain::monitor::MonitoringConfig;
use truthwatch_core::domain::post::Post;
use truthwatch_core::domain::profile::Profile;
use truthwatch_core::monitor::PostAlert;

pub const COLOR_BLUE: u32 = 0x3498db;
pub const COLOR_GREEN: u32 = 0x2ecc71;
pub const COLOR_RED: u32 = 0xe74c3c;

pub const MAX_CONTENT_CHARS: usize = 2_000;
pub const MAX_DESCRIPTION_CHARS: usize = 4_096;
pub const MAX_FIELD_VALUE_CHARS: usize = 1_024;
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

/// Body of a create-message call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl MessageTemplate {
    pub fn text(content: impl Into<String>) -> Self {
        MessageBuilder::new().line(content).build()
    }

    /// Plain text of the message, used for logs and tests.
    pub fn summary(&self) -> String {
        let mut parts = self.content.iter().cloned().collect::<Vec<_>>();
        parts.extend(self.embeds.iter().filter_map(|embed| embed.title.clone()));
        parts.join(" | ")
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    lines: Vec<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    pub fn embed<F>(mut self, color: u32, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let mut builder = EmbedBuilder::new(color);
        build(&mut builder);
        self.embeds.push(builder.build());
        self
    }

    pub fn build(self) -> MessageTemplate {
        let content = if self.lines.is_empty() {
            None
        } else {
            Some(truncate_chars(&self.lines.join("\n"), MAX_CONTENT_CHARS))
        };
        let mut embeds = self.embeds;
        embeds.truncate(MAX_EMBEDS_PER_MESSAGE);
        MessageTemplate { content, embeds }
    }
}

pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    fn new(color: u32) -> Self {
        Self {
            embed: Embed {
                title: None,
                url: None,
                description: None,
                color,
                timestamp: None,
                fields: Vec::new(),
                footer: None,
            },
        }
    }

    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.embed.title = Some(title.into());
        self
    }

    pub fn url(&mut self, url: impl Into<String>) -> &mut Self {
        self.embed.url = Some(url.into());
        self
    }

    pub fn description(&mut self, description: &str) -> &mut Self {
        self.embed.description = Some(truncate_chars(description, MAX_DESCRIPTION_CHARS));
        self
    }

    pub fn timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.embed.timestamp = Some(timestamp);
        self
    }

    pub fn field(&mut self, name: impl Into<String>, value: &str, inline: bool) -> &mut Self {
        self.embed.fields.push(EmbedField {
            name: name.into(),
            value: truncate_chars(value, MAX_FIELD_VALUE_CHARS),
            inline,
        });
        self
    }

    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    fn build(self) -> Embed {
        self.embed
    }
}

fn engagement_fields(embed: &mut EmbedBuilder, post: &Post) {
    embed
        .field("Likes", &format_count(post.likes_count), true)
        .field("Replies", &format_count(post.replies_count), true)
        .field("Reposts", &format_count(post.reposts_count), true);
}

pub fn profile_message(profile: &Profile, requested_by: &str) -> MessageTemplate {
    MessageBuilder::new()
        .embed(COLOR_BLUE, |embed| {
            embed
                .title(format!("Truth Social Profile: {}", profile.display_name))
                .url(profile.url())
                .field("Username", &format!("@{}", profile.username), true)
                .field("Verified", if profile.verified { "✅" } else { "❌" }, true)
                .field("Followers", &format_count(profile.followers_count), true)
                .field("Following", &format_count(profile.following_count), true)
                .field("Posts", &format_count(profile.posts_count), true)
                .field("Joined", &profile.created_at.format("%B %d, %Y").to_string(), true);
            if let Some(bio) = &profile.bio {
                embed.field("Bio", bio, false);
            }
            embed.footer(format!("Requested by {requested_by}")).timestamp(Utc::now());
        })
        .build()
}

pub fn recent_posts_message(target: &str, posts: &[Post], requested_by: &str) -> MessageTemplate {
    if posts.is_empty() {
        return MessageTemplate::text(format!("No recent posts found for {target}."));
    }

    posts
        .iter()
        .enumerate()
        .fold(MessageBuilder::new(), |builder, (index, post)| {
            builder.embed(COLOR_BLUE, |embed| {
                embed
                    .title(format!("Post {} by {}", index + 1, post.author.display_name))
                    .url(post.url())
                    .description(&post.content)
                    .timestamp(post.created_at);
                engagement_fields(embed, post);
                embed.footer(format!("Requested by {requested_by}"));
            })
        })
        .build()
}

/// Parameters echoed back in the footer of every search result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSummary {
    pub days: u32,
    pub keywords: Option<String>,
    pub notices: Vec<String>,
}

pub fn search_results_message(posts: &[Post], summary: &SearchSummary) -> MessageTemplate {
    let mut footer = format!("Posted within the last {} days", summary.days);
    if let Some(keywords) = &summary.keywords {
        footer.push_str(&format!("\nContains keywords: {keywords}"));
    }

    let builder = summary.notices.iter().fold(MessageBuilder::new(), |builder, notice| {
        builder.line(notice.clone())
    });
    posts
        .iter()
        .fold(builder, |builder, post| {
            builder.embed(COLOR_BLUE, |embed| {
                embed
                    .title(format!("Post by {}", post.author.display_name))
                    .url(post.url())
                    .description(&post.content)
                    .timestamp(post.created_at);
                engagement_fields(embed, post);
                embed.footer(footer.clone());
            })
        })
        .line(format!("Found {} posts matching your criteria.", posts.len()))
        .build()
}

pub fn alert_message(alert: &PostAlert) -> MessageTemplate {
    let post = &alert.post;
    MessageBuilder::new()
        .embed(COLOR_GREEN, |embed| {
            embed
                .title(format!("New post by {}", post.author.display_name))
                .url(post.url())
                .description(&post.content)
                .timestamp(post.created_at);
            engagement_fields(embed, post);
            embed.footer(format!("Matching keyword: {}", alert.keyword));
        })
        .build()
}

pub fn monitoring_started_message(target: &str, keyword: &str) -> MessageTemplate {
    MessageBuilder::new()
        .line(format!("Started monitoring posts from @{target} for keyword: {keyword}"))
        .line("I'll notify you when new matching posts are found!")
        .build()
}

pub fn monitoring_status_message(config: &MonitoringConfig) -> MessageTemplate {
    MessageBuilder::new()
        .embed(COLOR_BLUE, |embed| {
            embed
                .title("Monitoring Status")
                .field("Username", &config.target, true)
                .field("Keyword", &config.keyword, true)
                .field("Active", if config.active { "Yes" } else { "No" }, true);
            if let Some(last_checked) = config.last_checked_at {
                embed.field(
                    "Last Checked",
                    &last_checked.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    false,
                );
            }
            if let Some(post_id) = &config.last_seen_post_id {
                embed.field("Last Alerted Post", post_id.as_str(), false);
            }
        })
        .build()
}

pub fn help_overview(prefix: &str, entries: &[(&str, &str)]) -> MessageTemplate {
    MessageBuilder::new()
        .embed(COLOR_BLUE, |embed| {
            embed.title("Truth Social Bot Commands").description("Here are all available commands:");
            for (name, summary) in entries {
                embed.field(format!("{prefix}{name}"), summary, false);
            }
            embed.footer(format!("Use {prefix}help <command> for more details"));
        })
        .build()
}

pub fn help_detail(prefix: &str, name: &str, details: &str) -> MessageTemplate {
    MessageBuilder::new()
        .embed(COLOR_BLUE, |embed| {
            embed.title(format!("Command: {prefix}{name}")).description(details);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new()
        .embed(COLOR_RED, |embed| {
            embed.description(&format!("⚠️ {summary}")).footer(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

/// Groups digits in threes: `9000000` becomes `9,000,000`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut truncated = text.chars().take(limit.saturating_sub(1)).collect::<String>();
    truncated.push('…');
    truncated
}
