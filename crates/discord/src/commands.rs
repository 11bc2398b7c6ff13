use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use truthwatch_core::domain::profile::normalize_target;
use truthwatch_core::InterfaceError;

use crate::embeds::{self, MessageTemplate};

/// A guild or direct message as delivered by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePayload {
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub verb: String,
    pub args: Vec<String>,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub target: String,
    pub keywords: Option<String>,
    /// `None` means the configured default lookback.
    pub days: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Ping,
    Help { command: Option<String> },
    Profile { target: String },
    Posts { target: String },
    FilterPosts(SearchRequest),
    MonitorPosts { target: String, keyword: String },
    StopMonitoring,
    MonitoringStatus,
    Unknown { verb: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unterminated quote in command arguments")]
    UnterminatedQuote,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandUsageError {
    #[error("missing required argument `{argument}` for `{command}`")]
    MissingArgument { command: &'static str, argument: &'static str },
    #[error("invalid value `{value}` for `{argument}` of `{command}`")]
    InvalidArgument { command: &'static str, argument: &'static str, value: String },
}

impl CommandUsageError {
    fn command(&self) -> &'static str {
        match self {
            Self::MissingArgument { command, .. } | Self::InvalidArgument { command, .. } => command,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Usage(#[from] CommandUsageError),
    #[error(transparent)]
    Service(#[from] InterfaceError),
}

impl CommandRouteError {
    /// Renders the failure as a reply; nothing a user types escapes as a crash.
    pub fn to_message(&self, prefix: &str, request_id: &str) -> MessageTemplate {
        match self {
            Self::Usage(usage) => {
                let argument = match usage {
                    CommandUsageError::MissingArgument { argument, .. } => {
                        format!("Missing required argument: {argument}.")
                    }
                    CommandUsageError::InvalidArgument { argument, value, .. } => {
                        format!("Invalid value '{value}' for {argument}.")
                    }
                };
                let usage_line = find_command(usage.command())
                    .map(|spec| format!("Usage: {}", spec.usage_line(prefix)))
                    .unwrap_or_default();
                MessageTemplate::text(format!("{argument} {usage_line}").trim_end().to_owned())
            }
            Self::Service(error) => embeds::error_message(error.user_message(), request_id),
        }
    }
}

pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arguments: &'static str,
    pub summary: &'static str,
    pub example: &'static str,
    pub notes: &'static [&'static str],
}

impl CommandSpec {
    pub fn usage_line(&self, prefix: &str) -> String {
        if self.arguments.is_empty() {
            format!("{prefix}{}", self.name)
        } else {
            format!("{prefix}{} {}", self.name, self.arguments)
        }
    }

    pub fn details(&self, prefix: &str) -> String {
        let mut details = format!(
            "{}\n\nUsage: {}\nExample: {prefix}{}",
            self.summary,
            self.usage_line(prefix),
            self.example
        );
        if !self.aliases.is_empty() {
            let aliases = self.aliases.iter().map(|alias| format!("{prefix}{alias}")).collect::<Vec<_>>();
            details.push_str(&format!("\nAliases: {}", aliases.join(", ")));
        }
        for note in self.notes {
            details.push_str(&format!("\n- {note}"));
        }
        details
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        aliases: &[],
        arguments: "",
        summary: "Check the bot's gateway latency.",
        example: "ping",
        notes: &[],
    },
    CommandSpec {
        name: "help",
        aliases: &[],
        arguments: "[command]",
        summary: "Show help information for commands.",
        example: "help filter-posts",
        notes: &[],
    },
    CommandSpec {
        name: "truth-profile",
        aliases: &["profile"],
        arguments: "<username>",
        summary: "Fetch and display a Truth Social user's profile.",
        example: "truth-profile @realDonaldTrump",
        notes: &[],
    },
    CommandSpec {
        name: "truth-posts",
        aliases: &[],
        arguments: "<username>",
        summary: "Fetch and display a Truth Social user's recent posts.",
        example: "truth-posts @realDonaldTrump",
        notes: &[],
    },
    CommandSpec {
        name: "filter-posts",
        aliases: &[],
        arguments: "<username> [keywords] [days]",
        summary: "Filter posts by username, keywords, and date range.",
        example: "filter-posts realDonaldTrump \"election, border\" 7",
        notes: &[
            "Maximum 5 results per search",
            "30 second cooldown between searches",
            "Maximum 20 searches per hour",
            "Maximum 30 days lookback period",
        ],
    },
    CommandSpec {
        name: "monitor-posts",
        aliases: &[],
        arguments: "<username> <keyword>",
        summary: "Start monitoring posts for a specific keyword.",
        example: "monitor-posts realDonaldTrump \"election\"",
        notes: &[],
    },
    CommandSpec {
        name: "stop-monitoring",
        aliases: &[],
        arguments: "",
        summary: "Stop monitoring posts.",
        example: "stop-monitoring",
        notes: &[],
    },
    CommandSpec {
        name: "monitoring-status",
        aliases: &[],
        arguments: "",
        summary: "Check the current monitoring status.",
        example: "monitoring-status",
        notes: &[],
    },
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    let name = name.to_ascii_lowercase();
    COMMANDS
        .iter()
        .find(|spec| spec.name == name || spec.aliases.iter().any(|alias| *alias == name))
}

/// Returns `None` for messages not addressed to the bot: no prefix and no
/// leading mention of the bot user or its managed role.
pub fn normalize_command(
    payload: MessagePayload,
    prefix: &str,
    bot_user_id: Option<&str>,
) -> Result<Option<CommandEnvelope>, CommandParseError> {
    let content = payload.content.trim();
    let (body, mentioned) = match strip_mention(content, bot_user_id) {
        Some(rest) => (rest, true),
        None => match content.strip_prefix(prefix) {
            Some(rest) if !prefix.is_empty() => (rest, false),
            _ => return Ok(None),
        },
    };

    let mut tokens = tokenize(body)?.into_iter();
    let verb = match tokens.next() {
        Some(verb) => verb.to_ascii_lowercase(),
        None if mentioned => "help".to_owned(),
        None => return Ok(None),
    };

    Ok(Some(CommandEnvelope {
        verb,
        args: tokens.collect(),
        channel_id: payload.channel_id,
        guild_id: payload.guild_id,
        author_id: payload.author_id,
        author_name: payload.author_name,
        request_id: payload.message_id,
    }))
}

fn strip_mention<'a>(content: &'a str, bot_user_id: Option<&str>) -> Option<&'a str> {
    let id = bot_user_id?;
    ["<@", "<@!", "<@&"].iter().find_map(|opening| {
        content.strip_prefix(*opening)?.strip_prefix(id)?.strip_prefix('>')
    })
}

/// Whitespace splitting with double-quoted groups, so `"election fraud"`
/// stays one argument.
pub fn tokenize(input: &str) -> Result<Vec<String>, CommandParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' | '“' | '”' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            ch if ch.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            ch => current.push(ch),
        }
    }

    if in_quotes {
        return Err(CommandParseError::UnterminatedQuote);
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    Ok(tokens)
}

pub fn classify_command(verb: &str, args: &[String]) -> Result<BotCommand, CommandUsageError> {
    let required = |command: &'static str, argument: &'static str, index: usize| {
        args.get(index)
            .map(|value| normalize_target(value))
            .filter(|value| !value.is_empty())
            .ok_or(CommandUsageError::MissingArgument { command, argument })
    };

    let command = match verb {
        "ping" => BotCommand::Ping,
        "help" => BotCommand::Help { command: args.first().cloned() },
        "truth-profile" | "profile" => {
            BotCommand::Profile { target: required("truth-profile", "username", 0)? }
        }
        "truth-posts" => BotCommand::Posts { target: required("truth-posts", "username", 0)? },
        "filter-posts" => {
            let target = required("filter-posts", "username", 0)?;
            let keywords = args.get(1).map(|raw| raw.trim().to_owned()).filter(|raw| !raw.is_empty());
            let days = args.get(2).map(|raw| parse_days(raw)).transpose()?.filter(|days| *days > 0);
            BotCommand::FilterPosts(SearchRequest { target, keywords, days })
        }
        "monitor-posts" => {
            let target = required("monitor-posts", "username", 0)?;
            let keyword = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            let keyword = keyword.trim();
            if keyword.is_empty() {
                return Err(CommandUsageError::MissingArgument {
                    command: "monitor-posts",
                    argument: "keyword",
                });
            }
            BotCommand::MonitorPosts { target, keyword: keyword.to_owned() }
        }
        "stop-monitoring" => BotCommand::StopMonitoring,
        "monitoring-status" => BotCommand::MonitoringStatus,
        other => BotCommand::Unknown { verb: other.to_owned() },
    };
    Ok(command)
}

fn parse_days(raw: &str) -> Result<u32, CommandUsageError> {
    raw.trim().parse::<u32>().map_err(|_| CommandUsageError::InvalidArgument {
        command: "filter-posts",
        argument: "days",
        value: raw.to_owned(),
    })
}

pub fn help_message(prefix: &str, command: Option<&str>) -> MessageTemplate {
    match command {
        None => {
            let entries = COMMANDS.iter().map(|spec| (spec.name, spec.summary)).collect::<Vec<_>>();
            embeds::help_overview(prefix, &entries)
        }
        Some(name) => {
            let bare = name.strip_prefix(prefix).unwrap_or(name);
            match find_command(bare) {
                Some(spec) => embeds::help_detail(prefix, spec.name, &spec.details(prefix)),
                None => MessageTemplate::text(format!("Command '{name}' not found.")),
            }
        }
    }
}

pub struct CommandRouter<S> {
    service: S,
    prefix: String,
}

impl<S> CommandRouter<S>
where
    S: BotCommandService,
{
    pub fn new(service: S, prefix: impl Into<String>) -> Self {
        Self { service, prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, CommandRouteError> {
        let reply = match classify_command(&envelope.verb, &envelope.args)? {
            BotCommand::Ping => self.service.ping(envelope).await?,
            BotCommand::Help { command } => help_message(&self.prefix, command.as_deref()),
            BotCommand::Profile { target } => self.service.profile(&target, envelope).await?,
            BotCommand::Posts { target } => self.service.recent_posts(&target, envelope).await?,
            BotCommand::FilterPosts(request) => self.service.filter_posts(request, envelope).await?,
            BotCommand::MonitorPosts { target, keyword } => {
                self.service.start_monitoring(&target, &keyword, envelope).await?
            }
            BotCommand::StopMonitoring => self.service.stop_monitoring(envelope).await?,
            BotCommand::MonitoringStatus => self.service.monitoring_status(envelope).await?,
            BotCommand::Unknown { verb } => MessageTemplate::text(format!(
                "Unknown command `{prefix}{verb}`. Use `{prefix}help` to list commands.",
                prefix = self.prefix
            )),
        };
        Ok(reply)
    }
}

#[async_trait]
pub trait BotCommandService: Send + Sync {
    async fn ping(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError>;

    async fn profile(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError>;

    async fn recent_posts(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError>;

    async fn filter_posts(
        &self,
        request: SearchRequest,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError>;

    async fn start_monitoring(
        &self,
        target: &str,
        keyword: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError>;

    async fn stop_monitoring(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError>;

    async fn monitoring_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError>;
}

#[async_trait]
impl<T> BotCommandService for Arc<T>
where
    T: BotCommandService + ?Sized,
{
    async fn ping(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError> {
        (**self).ping(envelope).await
    }

    async fn profile(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        (**self).profile(target, envelope).await
    }

    async fn recent_posts(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        (**self).recent_posts(target, envelope).await
    }

    async fn filter_posts(
        &self,
        request: SearchRequest,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        (**self).filter_posts(request, envelope).await
    }

    async fn start_monitoring(
        &self,
        target: &str,
        keyword: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        (**self).start_monitoring(target, keyword, envelope).await
    }

    async fn stop_monitoring(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError> {
        (**self).stop_monitoring(envelope).await
    }

    async fn monitoring_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        (**self).monitoring_status(envelope).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::EchoService;
    use super::{
        classify_command, help_message, normalize_command, tokenize, BotCommand, CommandEnvelope,
        CommandParseError, CommandRouteError, CommandRouter, CommandUsageError, MessagePayload,
        SearchRequest,
    };

    fn payload(content: &str) -> MessagePayload {
        MessagePayload {
            message_id: "m-1".to_owned(),
            channel_id: "c-1".to_owned(),
            guild_id: Some("g-1".to_owned()),
            author_id: "u-1".to_owned(),
            author_name: "alice".to_owned(),
            author_is_bot: false,
            content: content.to_owned(),
        }
    }

    fn envelope(content: &str) -> CommandEnvelope {
        normalize_command(payload(content), "!", Some("42")).expect("parse").expect("addressed")
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn prefix_and_mentions_address_the_bot() {
        for content in ["!PING", "<@42> ping", "<@!42> ping", "<@&42>   ping"] {
            let envelope = envelope(content);
            assert_eq!(envelope.verb, "ping", "{content}");
            assert!(envelope.args.is_empty());
        }
        assert_eq!(envelope("<@42>").verb, "help");
    }

    #[test]
    fn unaddressed_messages_are_ignored() {
        for content in ["hello there", "<@7> ping", "!", "  "] {
            assert_eq!(normalize_command(payload(content), "!", Some("42")), Ok(None), "{content}");
        }
        assert_eq!(normalize_command(payload("<@42> ping"), "!", None), Ok(None));
    }

    #[test]
    fn quoted_arguments_stay_together() {
        assert_eq!(
            tokenize(r#"filter-posts @someone "election fraud" 7"#),
            Ok(args(&["filter-posts", "@someone", "election fraud", "7"]))
        );
        assert_eq!(tokenize(r#"a "" b"#), Ok(args(&["a", "", "b"])));
        assert_eq!(tokenize(r#"a "open"#), Err(CommandParseError::UnterminatedQuote));
    }

    #[test]
    fn filter_posts_arguments_are_optional_and_validated() {
        assert_eq!(
            classify_command("filter-posts", &args(&["@someone"])),
            Ok(BotCommand::FilterPosts(SearchRequest {
                target: "someone".to_owned(),
                keywords: None,
                days: None,
            }))
        );
        assert_eq!(
            classify_command("filter-posts", &args(&["someone", "tariffs, border", "45"])),
            Ok(BotCommand::FilterPosts(SearchRequest {
                target: "someone".to_owned(),
                keywords: Some("tariffs, border".to_owned()),
                days: Some(45),
            }))
        );
        assert_eq!(
            classify_command("filter-posts", &args(&["someone", "x", "0"])),
            Ok(BotCommand::FilterPosts(SearchRequest {
                target: "someone".to_owned(),
                keywords: Some("x".to_owned()),
                days: None,
            }))
        );
        assert!(matches!(
            classify_command("filter-posts", &args(&["someone", "x", "week"])),
            Err(CommandUsageError::InvalidArgument { argument: "days", .. })
        ));
    }

    #[test]
    fn missing_arguments_are_usage_errors() {
        assert_eq!(
            classify_command("truth-profile", &[]),
            Err(CommandUsageError::MissingArgument { command: "truth-profile", argument: "username" })
        );
        assert_eq!(
            classify_command("monitor-posts", &args(&["someone"])),
            Err(CommandUsageError::MissingArgument { command: "monitor-posts", argument: "keyword" })
        );
        assert_eq!(
            classify_command("monitor-posts", &args(&["@someone", "border", "wall"])),
            Ok(BotCommand::MonitorPosts {
                target: "someone".to_owned(),
                keyword: "border wall".to_owned()
            })
        );
    }

    #[test]
    fn profile_alias_routes_to_profile() {
        assert_eq!(
            classify_command("profile", &args(&["@someone"])),
            Ok(BotCommand::Profile { target: "someone".to_owned() })
        );
    }

    #[test]
    fn help_lists_commands_or_describes_one() {
        let overview = help_message("!", None);
        let fields = &overview.embeds[0].fields;
        assert!(fields.iter().any(|field| field.name == "!filter-posts"));
        assert!(fields.iter().any(|field| field.name == "!monitoring-status"));

        let detail = help_message("!", Some("!profile"));
        assert_eq!(detail.embeds[0].title.as_deref(), Some("Command: !truth-profile"));
        assert!(detail.embeds[0]
            .description
            .as_deref()
            .is_some_and(|text| text.contains("Usage: !truth-profile <username>")));

        let missing = help_message("!", Some("nope"));
        assert_eq!(missing.content.as_deref(), Some("Command 'nope' not found."));
    }

    #[tokio::test]
    async fn router_dispatches_to_service() {
        let router = CommandRouter::new(EchoService::default(), "!");

        let reply = router.route(&envelope(r#"!monitor-posts @someone "border wall""#)).await.expect("route");
        assert_eq!(reply.content.as_deref(), Some("monitor someone border wall in c-1"));

        let reply = router.route(&envelope("!dance")).await.expect("route");
        assert_eq!(
            reply.content.as_deref(),
            Some("Unknown command `!dance`. Use `!help` to list commands.")
        );
    }

    #[tokio::test]
    async fn route_errors_render_as_replies() {
        let router = CommandRouter::new(EchoService::default(), "!");

        let usage = router.route(&envelope("!truth-posts")).await.expect_err("usage");
        assert_eq!(
            usage.to_message("!", "m-1").content.as_deref(),
            Some("Missing required argument: username. Usage: !truth-posts <username>")
        );

        let service = router.route(&envelope("!truth-profile nobody")).await.expect_err("not found");
        assert!(matches!(service, CommandRouteError::Service(_)));
        let rendered = service.to_message("!", "m-1");
        let embed = &rendered.embeds[0];
        assert!(embed
            .description
            .as_deref()
            .is_some_and(|text| text.contains("No Truth Social account was found")));
        assert_eq!(
            embed.footer.as_ref().map(|footer| footer.text.as_str()),
            Some("Correlation ID: m-1")
        );
    }
}
