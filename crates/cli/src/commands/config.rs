use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use truthwatch_core::config::{AppConfig, LoadOptions};

struct Field<'a> {
    key_path: &'static str,
    value: String,
    env_keys: &'a [&'static str],
}

impl<'a> Field<'a> {
    fn new(key_path: &'static str, value: impl Into<String>, env_keys: &'a [&'static str]) -> Self {
        Self { key_path, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field<'static>> {
    let alert_channels = if config.discord.alert_channel_ids.is_empty() {
        "<none>".to_string()
    } else {
        config.discord.alert_channel_ids.join(",")
    };

    vec![
        Field::new("database.url", config.database.url.clone(), &["TRUTHWATCH_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["TRUTHWATCH_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["TRUTHWATCH_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "discord.bot_token",
            redact_token(config.discord.bot_token.expose_secret()),
            &["TRUTHWATCH_DISCORD_BOT_TOKEN", "DISCORD_TOKEN"],
        ),
        Field::new(
            "discord.command_prefix",
            config.discord.command_prefix.clone(),
            &["TRUTHWATCH_DISCORD_COMMAND_PREFIX", "BOT_PREFIX"],
        ),
        Field::new(
            "discord.alert_channel_ids",
            alert_channels,
            &["TRUTHWATCH_DISCORD_ALERT_CHANNEL_IDS"],
        ),
        Field::new(
            "scraper.api_token",
            redact_token(config.scraper.api_token.expose_secret()),
            &["TRUTHWATCH_SCRAPER_API_TOKEN", "APIFY_API_TOKEN"],
        ),
        Field::new(
            "scraper.actor_id",
            config.scraper.actor_id.clone(),
            &["TRUTHWATCH_SCRAPER_ACTOR_ID", "APIFY_ACTOR_ID"],
        ),
        Field::new("scraper.base_url", config.scraper.base_url.clone(), &["TRUTHWATCH_SCRAPER_BASE_URL"]),
        Field::new(
            "scraper.timeout_secs",
            config.scraper.timeout_secs.to_string(),
            &["TRUTHWATCH_SCRAPER_TIMEOUT_SECS"],
        ),
        Field::new(
            "scraper.max_posts",
            config.scraper.max_posts.to_string(),
            &["TRUTHWATCH_SCRAPER_MAX_POSTS"],
        ),
        Field::new(
            "monitor.poll_interval_secs",
            config.monitor.poll_interval_secs.to_string(),
            &["TRUTHWATCH_MONITOR_POLL_INTERVAL_SECS"],
        ),
        Field::new(
            "monitor.fetch_limit",
            config.monitor.fetch_limit.to_string(),
            &["TRUTHWATCH_MONITOR_FETCH_LIMIT"],
        ),
        Field::new("search.max_results", config.search.max_results.to_string(), &[]),
        Field::new(
            "search.cooldown_secs",
            config.search.cooldown_secs.to_string(),
            &["TRUTHWATCH_SEARCH_COOLDOWN_SECS"],
        ),
        Field::new(
            "search.max_requests_per_hour",
            config.search.max_requests_per_hour.to_string(),
            &["TRUTHWATCH_SEARCH_MAX_REQUESTS_PER_HOUR"],
        ),
        Field::new("search.default_days", config.search.default_days.to_string(), &[]),
        Field::new("search.max_days", config.search.max_days.to_string(), &[]),
        Field::new("search.recent_posts", config.search.recent_posts.to_string(), &[]),
        Field::new(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["TRUTHWATCH_SERVER_BIND_ADDRESS"],
        ),
        Field::new(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["TRUTHWATCH_SERVER_HEALTH_CHECK_PORT"],
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["TRUTHWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["TRUTHWATCH_LOGGING_LEVEL", "TRUTHWATCH_LOG_LEVEL", "LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TRUTHWATCH_LOGGING_FORMAT", "TRUTHWATCH_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("truthwatch.toml"), PathBuf::from("config/truthwatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some(rest) = trimmed.strip_prefix("apify_api_") {
        if !rest.is_empty() {
            return "apify_api_***".to_string();
        }
    }

    "<redacted>".to_string()
}
